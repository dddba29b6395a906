//! Authentication strategies for SSH hops.
//!
//! Identities are loaded once, when the session factory is built, and then
//! offered to every hop in configuration order by an [`AuthChain`].
//!
//! # Example
//!
//! ```ignore
//! use ssh_tunnelable::ssh::auth::{AuthChain, KeyAuth};
//!
//! let chain = AuthChain::new()
//!     .with_key(KeyAuth::load("/path/to/id_ed25519")?)
//!     .with_key(KeyAuth::load("/path/to/id_rsa")?);
//!
//! let ok = chain.authenticate(&mut handle, "deploy").await?;
//! ```

mod chain;
mod key;
mod traits;

pub use chain::AuthChain;
pub use key::KeyAuth;
pub use traits::AuthStrategy;
