//! Tunnel connection managers.
//!
//! A tunnel forwards a local TCP endpoint through one or more SSH hops to a
//! remote endpoint. It is described by a [`TunnelSpec`], rendered as the
//! expression
//!
//! ```text
//! [<hop1>-><hop2>->...-><hopN>|]<localHost>:<localPort>:<remoteHost>:<remotePort>
//! ```
//!
//! and driven through a [`TunnelConnectionManager`] with idempotent
//! `open`, `ensure_open` and `close` intents.
//!
//! # Components
//!
//! - [`TunnelConnectionManagerFactory`]: validates endpoints, allocates the
//!   local port and builds managers
//! - [`DefaultTunnelConnectionManager`]: hop chain plus local forwarding
//! - `forward`: local listener and `direct-tcpip` forwarding loop

mod factory;
mod forward;
mod manager;

use async_trait::async_trait;

use super::error::Result;
use super::route::{HOP_SEPARATOR, Route, strip_whitespace};

pub use factory::{
    DefaultTunnelConnectionManagerFactory, FIRST_AVAILABLE_PORT, TunnelConnectionManagerFactory,
    allocate_local_port,
};
pub use manager::DefaultTunnelConnectionManager;

/// Local alias used by [`TunnelConnectionManagerFactory::create`].
pub const LOCALHOST: &str = "localhost";

/// Endpoints and hops of one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    route: Option<String>,
    local_host: String,
    local_port: u16,
    remote_host: String,
    remote_port: u16,
}

impl TunnelSpec {
    /// `route` is stripped of whitespace; a missing or blank route makes a
    /// direct tunnel to `remote_host`.
    pub fn new(
        route: Option<&str>,
        local_host: impl Into<String>,
        local_port: u16,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> Self {
        let route = route
            .map(strip_whitespace)
            .filter(|route| !route.is_empty());
        Self {
            route,
            local_host: local_host.into(),
            local_port,
            remote_host: remote_host.into(),
            remote_port,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.route.is_none()
    }

    /// The hop part of the expression. Direct tunnels are labelled
    /// `<localHost>-><remoteHost>`; the label is not parsed back.
    pub fn hop_prefix(&self) -> String {
        match &self.route {
            Some(route) => route.clone(),
            None => format!("{}{}{}", self.local_host, HOP_SEPARATOR, self.remote_host),
        }
    }

    /// The hops to connect through. A direct tunnel uses the remote host as
    /// its only hop.
    pub fn route(&self) -> Result<Route> {
        match &self.route {
            Some(route) => Route::parse(route),
            None => Ok(Route::direct(&self.remote_host)),
        }
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// `<localHost>:<localPort>:<remoteHost>:<remotePort>`
    pub fn spec(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.local_host, self.local_port, self.remote_host, self.remote_port
        )
    }

    /// `<hopPrefix>|<spec>`
    pub fn expression(&self) -> String {
        format!("{}|{}", self.hop_prefix(), self.spec())
    }
}

/// Read-only view of an established or planned tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub assigned_local_port: u16,
    pub local_alias: String,
    pub destination_hostname: String,
    pub destination_port: u16,
    pub spec: String,
}

impl From<&TunnelSpec> for Tunnel {
    fn from(spec: &TunnelSpec) -> Self {
        Self {
            assigned_local_port: spec.local_port(),
            local_alias: spec.local_host().to_string(),
            destination_hostname: spec.remote_host().to_string(),
            destination_port: spec.remote_port(),
            spec: spec.spec(),
        }
    }
}

/// Drives one tunnel. Every intent is idempotent and safe to repeat.
#[async_trait]
pub trait TunnelConnectionManager: Send + Sync {
    /// Open the tunnel. No-op when it is already open.
    async fn open(&self) -> Result<()>;

    /// Open the tunnel unless it is open and healthy.
    async fn ensure_open(&self) -> Result<()>;

    /// Close the tunnel. No-op when it is not open.
    async fn close(&self) -> Result<()>;

    /// The tunnel forwarding to `remote_host:remote_port`, if this manager
    /// owns one.
    fn tunnel(&self, remote_host: &str, remote_port: u16) -> Option<Tunnel>;

    /// Endpoints and hops this manager was built for.
    fn spec(&self) -> &TunnelSpec;
}
