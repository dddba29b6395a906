//! Tunnel connection manager construction.

use std::sync::Arc;

use tracing::debug;

use crate::ssh::error::{Result, SshError};
use crate::ssh::session::{DefaultSessionFactorySupplier, SessionFactorySupplier};
use crate::ssh::settings::SshSettings;

use super::{DefaultTunnelConnectionManager, LOCALHOST, TunnelConnectionManager, TunnelSpec};

/// Local port value asking for an OS-assigned port.
pub const FIRST_AVAILABLE_PORT: u16 = 0;

/// Ask the OS for a free local port.
///
/// The port is only a snapshot: the listener is released before the
/// tunnel binds it, so another process may take it in between.
pub fn allocate_local_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("0.0.0.0", 0))
        .map_err(|source| SshError::PortAllocation { source })?;
    let port = listener
        .local_addr()
        .map_err(|source| SshError::PortAllocation { source })?
        .port();
    debug!("Allocated local port {}", port);
    Ok(port)
}

/// Builds tunnel connection managers for one settings object.
pub trait TunnelConnectionManagerFactory: Send + Sync {
    fn settings(&self) -> &SshSettings;

    /// Manager for a tunnel from an OS-assigned port on [`LOCALHOST`] to
    /// `remote_host:remote_port`.
    fn create(
        &self,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn TunnelConnectionManager>> {
        self.create_with_local(
            LOCALHOST,
            FIRST_AVAILABLE_PORT,
            remote_host,
            remote_port,
        )
    }

    /// Manager for a tunnel from `local_host:local_port` to
    /// `remote_host:remote_port`. A `local_port` of
    /// [`FIRST_AVAILABLE_PORT`] is replaced by a free port.
    fn create_with_local(
        &self,
        local_host: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn TunnelConnectionManager>>;
}

/// Builds [`DefaultTunnelConnectionManager`]s that share one session factory.
pub struct DefaultTunnelConnectionManagerFactory {
    settings: SshSettings,
    sessions: Arc<dyn SessionFactorySupplier>,
}

impl DefaultTunnelConnectionManagerFactory {
    pub fn new(settings: SshSettings, sessions: Arc<dyn SessionFactorySupplier>) -> Self {
        Self { settings, sessions }
    }

    /// Factory with a [`DefaultSessionFactorySupplier`] for `settings`.
    pub fn from_settings(settings: SshSettings) -> Self {
        let sessions = Arc::new(DefaultSessionFactorySupplier::new(settings.clone()));
        Self::new(settings, sessions)
    }

    /// Validate the endpoints and resolve the local port.
    pub fn tunnel_spec(
        &self,
        local_host: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<TunnelSpec> {
        if local_host.trim().is_empty() {
            return Err(SshError::invalid_endpoint(
                "local_host",
                "localHost is required",
            ));
        }
        if remote_host.trim().is_empty() {
            return Err(SshError::invalid_endpoint(
                "remote_host",
                "remoteHost is required",
            ));
        }
        if remote_port == 0 {
            return Err(SshError::invalid_endpoint(
                "remote_port",
                "remotePort must be a valid port number, a value between 1 and 65535",
            ));
        }

        let local_port = match local_port {
            FIRST_AVAILABLE_PORT => allocate_local_port()?,
            port => port,
        };

        Ok(TunnelSpec::new(
            self.settings.route(),
            local_host,
            local_port,
            remote_host,
            remote_port,
        ))
    }
}

impl TunnelConnectionManagerFactory for DefaultTunnelConnectionManagerFactory {
    fn settings(&self) -> &SshSettings {
        &self.settings
    }

    fn create_with_local(
        &self,
        local_host: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn TunnelConnectionManager>> {
        let spec = self.tunnel_spec(local_host, local_port, remote_host, remote_port)?;
        let expression = spec.expression();
        debug!("Creating tunnel connection manager: {}", expression);

        self.sessions
            .get()
            .and_then(|sessions| DefaultTunnelConnectionManager::new(spec, sessions))
            .map(|manager| Box::new(manager) as Box<dyn TunnelConnectionManager>)
            .map_err(|e| SshError::TunnelConstruction {
                expression,
                source: Box::new(e),
            })
    }
}
