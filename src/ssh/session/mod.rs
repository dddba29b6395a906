//! SSH session capability.
//!
//! A [`SessionFactory`] turns one [`Hop`] into an authenticated russh session.
//! The first hop of a route is reached over TCP; every later hop is reached
//! through a `direct-tcpip` channel opened on the previous hop's session and
//! handed to `russh::client::connect_stream`.
//!
//! # Components
//!
//! - [`TunnelClientHandler`]: russh handler verifying host keys against the
//!   configured known hosts file
//! - [`DefaultSessionFactory`]: connects and authenticates hops
//! - [`DelegatingSessionFactory`]: applies the session timeout to a factory
//! - [`DefaultSessionFactorySupplier`]: builds the factory once per settings

mod factory;
mod supplier;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::{debug, warn};

use super::error::Result;
use super::route::Hop;

pub use factory::{DefaultSessionFactory, DelegatingSessionFactory};
pub use supplier::{DefaultSessionFactorySupplier, SessionFactorySupplier};

/// An authenticated session on one hop.
pub type SessionHandle = client::Handle<TunnelClientHandler>;

/// Connects and authenticates hops. Shared by every tunnel built from the
/// same settings, and never mutated after construction.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Login user for hops without `user@`.
    fn username(&self) -> &str;

    /// Host reported for diagnostics.
    fn hostname(&self) -> &str;

    /// SSH port for hops without an explicit port.
    fn port(&self) -> u16;

    /// Session inactivity timeout, `None` when sessions never expire.
    fn session_timeout(&self) -> Option<Duration> {
        None
    }

    /// russh configuration used for every hop.
    fn client_config(&self) -> Arc<client::Config>;

    /// Connect to `hop` with `config`, directly when `via` is `None` or
    /// through a channel of the `via` session otherwise.
    async fn connect_with(
        &self,
        config: Arc<client::Config>,
        hop: &Hop,
        via: Option<&SessionHandle>,
    ) -> Result<SessionHandle>;

    /// Connect to `hop` with this factory's own configuration.
    async fn connect(&self, hop: &Hop, via: Option<&SessionHandle>) -> Result<SessionHandle> {
        self.connect_with(self.client_config(), hop, via).await
    }
}

/// Build russh client configuration.
///
/// Keepalives are sent every 30 seconds, at most 3 unanswered, so that a dead
/// hop is noticed and reported as closed. `inactivity_timeout` of `None`
/// keeps idle sessions open indefinitely.
pub(crate) fn build_client_config(inactivity_timeout: Option<Duration>) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Client handler for russh that verifies host keys.
///
/// Keys are looked up in the known hosts file for the hop's `host:port`.
/// A recorded key that differs from the presented one is always rejected.
/// With strict checking, hosts that are not recorded (or a known hosts file
/// that cannot be read) are rejected too; without it they are accepted, like
/// `StrictHostKeyChecking=no` in OpenSSH.
pub struct TunnelClientHandler {
    host: String,
    port: u16,
    known_hosts: Option<Arc<PathBuf>>,
    strict: bool,
}

impl TunnelClientHandler {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        known_hosts: Option<Arc<PathBuf>>,
        strict: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            known_hosts,
            strict,
        }
    }

    fn verify(&self, server_public_key: &keys::PublicKey) -> bool {
        let Some(path) = &self.known_hosts else {
            if self.strict {
                warn!(
                    "Rejecting host key for {}:{}: no known hosts file",
                    self.host, self.port
                );
            }
            return !self.strict;
        };

        match keys::check_known_hosts_path(&self.host, self.port, server_public_key, path.as_path()) {
            Ok(true) => {
                debug!("Host key for {}:{} matches known hosts", self.host, self.port);
                true
            }
            Ok(false) if self.strict => {
                warn!(
                    "Rejecting unknown host key for {}:{} (strict host key checking)",
                    self.host, self.port
                );
                false
            }
            Ok(false) => {
                debug!("Accepting unknown host key for {}:{}", self.host, self.port);
                true
            }
            Err(keys::Error::KeyChanged { line }) => {
                warn!(
                    "Host key for {}:{} differs from known hosts entry on line {}",
                    self.host, self.port, line
                );
                false
            }
            Err(e) => {
                if self.strict {
                    warn!(
                        "Rejecting host key for {}:{}: cannot read known hosts: {}",
                        self.host, self.port, e
                    );
                }
                !self.strict
            }
        }
    }
}

impl client::Handler for TunnelClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify(server_public_key))
    }
}
