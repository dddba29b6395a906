//! SSH tunnelling module.
//!
//! This module is organized into the following submodules:
//!
//! - `settings`: validated tunnel settings and their builder
//! - `mapper`: mutable, deserializable settings front-end with validation
//! - `config`: environment variable resolution
//! - `route`: multi-hop route syntax
//! - `error`: error types and retry classification
//! - `auth`: public key authentication strategies
//! - `session`: hop connection, host key verification and the memoized
//!   session factory supplier
//! - `tunnel`: tunnel specs, managers and local forwarding
//! - `checker`: call classification policy
//! - `tunnelable`: lazy tunnels around client objects

pub mod auth;
pub mod checker;
pub mod config;
pub mod error;
pub mod mapper;
pub mod route;
pub mod session;
pub mod settings;
pub mod tunnel;
pub mod tunnelable;

#[cfg(test)]
pub(crate) mod testing;

pub use checker::{DefaultMethodChecker, Intent, MethodChecker};
pub use error::{Result, SshError};
pub use mapper::SshSettingsMapper;
pub use settings::{SshSettings, SshSettingsBuilder};
pub use tunnelable::{TunnelableFactory, TunnelableSupplier, Tunnelled};
