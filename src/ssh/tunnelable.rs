//! Lazy SSH tunnels around client objects.
//!
//! [`TunnelableFactory::wrap`] opens a tunnel to a remote endpoint, then
//! builds the client that talks through it and returns both as a
//! [`Tunnelled`] value. Every call forwarded through [`Tunnelled`] is named
//! by an operation identifier, which a [`MethodChecker`] classifies:
//!
//! - tunnelled operations (`connect`, ...) ensure the tunnel is open first,
//!   so a client can reconnect after the tunnel dropped;
//! - shutdown operations (`close`, ...) close the tunnel after the call,
//!   whether the call succeeded or not;
//! - every other operation is forwarded untouched.
//!
//! ```no_run
//! use ssh_tunnelable::ssh::checker::DefaultMethodChecker;
//! use ssh_tunnelable::ssh::settings::SshSettings;
//! use ssh_tunnelable::ssh::tunnelable::TunnelableFactory;
//!
//! # struct Client;
//! # impl Client {
//! #     fn new(_port: u16) -> Self { Client }
//! #     async fn connect(&mut self) -> Result<(), ssh_tunnelable::ssh::error::SshError> { Ok(()) }
//! # }
//! # async fn run() -> Result<(), ssh_tunnelable::ssh::error::SshError> {
//! let settings = SshSettings::builder()
//!     .with_route("bastion -> db-gateway".to_string())
//!     .with_private_keys("/home/deploy/.ssh/id_ed25519".to_string())
//!     .with_known_hosts("/home/deploy/.ssh/known_hosts".to_string())
//!     .build()?;
//!
//! let factory = TunnelableFactory::new(settings);
//! let mut client = factory
//!     .wrap_with_local(
//!         || Client::new(15432),
//!         DefaultMethodChecker,
//!         "localhost",
//!         15432,
//!         "db.internal",
//!         5432,
//!     )
//!     .await?;
//! client.invoke_mut("connect", |c| c.connect()).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tracing::{debug, warn};

use super::checker::{Intent, MethodChecker};
use super::error::{Result, SshError};
use super::settings::SshSettings;
use super::tunnel::{
    DefaultTunnelConnectionManagerFactory, LOCALHOST, TunnelConnectionManager,
    TunnelConnectionManagerFactory,
};

/// Produces the wrapped client once the tunnel is open.
pub trait TunnelableSupplier<T> {
    fn supply(self) -> T;
}

impl<T, F: FnOnce() -> T> TunnelableSupplier<T> for F {
    fn supply(self) -> T {
        self()
    }
}

/// Wraps clients in tunnels built by a [`TunnelConnectionManagerFactory`].
pub struct TunnelableFactory<F = DefaultTunnelConnectionManagerFactory> {
    factory: F,
}

impl TunnelableFactory {
    /// Factory backed by a [`DefaultTunnelConnectionManagerFactory`] for
    /// `settings`.
    pub fn new(settings: SshSettings) -> Self {
        Self::with_factory(DefaultTunnelConnectionManagerFactory::from_settings(settings))
    }
}

impl<F: TunnelConnectionManagerFactory> TunnelableFactory<F> {
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Open a tunnel from a free local port to `remote_host:remote_port`,
    /// then build the client with `supplier`.
    ///
    /// The supplier runs only after the tunnel is open. Clients that need
    /// to know the local port up front use
    /// [`wrap_with_local`](Self::wrap_with_local).
    pub async fn wrap<T, C, S>(
        &self,
        supplier: S,
        checker: C,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Tunnelled<T, C>>
    where
        C: MethodChecker,
        S: TunnelableSupplier<T>,
    {
        let manager = self.factory.create(remote_host, remote_port)?;
        self.open_and_wrap(manager, supplier, checker, remote_host, remote_port)
            .await
    }

    /// Like [`wrap`](Self::wrap), with an explicit local endpoint.
    pub async fn wrap_with_local<T, C, S>(
        &self,
        supplier: S,
        checker: C,
        local_host: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Tunnelled<T, C>>
    where
        C: MethodChecker,
        S: TunnelableSupplier<T>,
    {
        let manager =
            self.factory
                .create_with_local(local_host, local_port, remote_host, remote_port)?;
        self.open_and_wrap(manager, supplier, checker, remote_host, remote_port)
            .await
    }

    async fn open_and_wrap<T, C, S>(
        &self,
        manager: Box<dyn TunnelConnectionManager>,
        supplier: S,
        checker: C,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Tunnelled<T, C>>
    where
        C: MethodChecker,
        S: TunnelableSupplier<T>,
    {
        self.open_tunnel(manager.as_ref(), remote_host, remote_port)
            .await?;
        Ok(Tunnelled {
            manager,
            delegate: supplier.supply(),
            checker,
        })
    }

    async fn open_tunnel(
        &self,
        manager: &dyn TunnelConnectionManager,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<()> {
        let route = self.factory.settings().route().unwrap_or_default();
        debug!(
            "Creating tunnel: {}:? -> {} -> {}:{}",
            LOCALHOST, route, remote_host, remote_port
        );

        let local_port = manager
            .tunnel(remote_host, remote_port)
            .map(|tunnel| tunnel.assigned_local_port);
        let opened = match local_port {
            Some(_) => manager.open().await,
            None => Err(SshError::connection(format!(
                "No tunnel to {}:{}",
                remote_host, remote_port
            ))),
        };

        opened.map_err(|e| {
            SshError::tunnel(
                format!(
                    "Unable to establish SSH tunnel: '{}:?' -> '{}' -> '{}:{}'",
                    LOCALHOST, route, remote_host, remote_port
                ),
                e,
            )
        })?;

        debug!(
            "Tunnel created: {}:{} -> {} -> {}:{}",
            LOCALHOST,
            local_port.unwrap_or_default(),
            route,
            remote_host,
            remote_port
        );
        Ok(())
    }
}

/// A client paired with the tunnel it talks through.
///
/// Calls are forwarded with [`invoke`](Self::invoke) and friends under an
/// operation name. The tunnel is opened, closed or left alone around each
/// call according to the checker; the client's own results come back
/// unchanged, and tunnel failures are converted into the caller's error
/// type with `From<SshError>`.
pub struct Tunnelled<T, C> {
    manager: Box<dyn TunnelConnectionManager>,
    delegate: T,
    checker: C,
}

impl<T, C: MethodChecker> Tunnelled<T, C> {
    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    pub fn manager(&self) -> &dyn TunnelConnectionManager {
        self.manager.as_ref()
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// How a call to `operation` is handled.
    pub fn intent(&self, operation: &str) -> Intent {
        Intent::of(&self.checker, operation)
    }

    /// Forward an async call borrowing the client.
    pub async fn invoke<'a, R, E, F, Fut>(&'a self, operation: &str, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&'a T) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<SshError>,
    {
        let intent = self.intent(operation);
        dispatch(self.manager.as_ref(), operation, intent, move || f(&self.delegate)).await
    }

    /// Forward an async call mutably borrowing the client.
    pub async fn invoke_mut<'a, R, E, F, Fut>(
        &'a mut self,
        operation: &str,
        f: F,
    ) -> std::result::Result<R, E>
    where
        F: FnOnce(&'a mut T) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<SshError>,
    {
        let intent = self.intent(operation);
        let Self {
            manager, delegate, ..
        } = self;
        dispatch(manager.as_ref(), operation, intent, move || f(delegate)).await
    }

    /// Forward a synchronous call borrowing the client.
    pub async fn call<R, E, F>(&self, operation: &str, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&T) -> std::result::Result<R, E>,
        E: From<SshError>,
    {
        let intent = self.intent(operation);
        dispatch(self.manager.as_ref(), operation, intent, move || {
            std::future::ready(f(&self.delegate))
        })
        .await
    }

    /// Forward a synchronous call mutably borrowing the client.
    pub async fn call_mut<R, E, F>(&mut self, operation: &str, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut T) -> std::result::Result<R, E>,
        E: From<SshError>,
    {
        let intent = self.intent(operation);
        let Self {
            manager, delegate, ..
        } = self;
        dispatch(manager.as_ref(), operation, intent, move || {
            std::future::ready(f(delegate))
        })
        .await
    }
}

/// Run `call` with the tunnel handling `intent` asks for.
///
/// On [`Intent::Close`] the tunnel is closed even when the call failed; the
/// call's error wins over a close error.
async fn dispatch<R, E, F, Fut>(
    manager: &dyn TunnelConnectionManager,
    operation: &str,
    intent: Intent,
    call: F,
) -> std::result::Result<R, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<R, E>>,
    E: From<SshError>,
{
    match intent {
        Intent::EnsureOpen => {
            debug!("Ensuring tunnel is open before '{}'", operation);
            manager.ensure_open().await?;
            call().await
        }
        Intent::Close => {
            let outcome = call().await;
            debug!("Closing tunnel after '{}'", operation);
            match (outcome, manager.close().await) {
                (outcome, Ok(())) => outcome,
                (Ok(_), Err(e)) => Err(e.into()),
                (Err(call_err), Err(e)) => {
                    warn!("Failed to close tunnel after failed '{}': {}", operation, e);
                    Err(call_err)
                }
            }
        }
        Intent::PassThrough => call().await,
    }
}
