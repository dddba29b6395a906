//! Default tunnel connection manager.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ssh::error::{Result, SshError};
use crate::ssh::route::Route;
use crate::ssh::session::{SessionFactory, SessionHandle};

use super::forward::{bind_listener, spawn_forwarding};
use super::{Tunnel, TunnelConnectionManager, TunnelSpec};

enum State {
    Unopened,
    Open(OpenTunnel),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Unopened => "unopened",
            State::Open(_) => "open",
            State::Closed => "closed",
        }
    }
}

/// Sessions and forwarding task of an open tunnel.
struct OpenTunnel {
    hops: Vec<Arc<SessionHandle>>,
    cancel: CancellationToken,
    forwarding: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl OpenTunnel {
    fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
            && !self.forwarding.is_finished()
            && self.hops.last().is_some_and(|hop| !hop.is_closed())
    }

    /// Stop forwarding, releasing the local port, and disconnect every hop,
    /// last hop first. All hops are attempted; the first failure is returned.
    async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        if let Err(e) = self.forwarding.await {
            debug!("Forwarding task ended abnormally: {}", e);
        }
        disconnect_all(&self.hops).await
    }
}

async fn disconnect_all(hops: &[Arc<SessionHandle>]) -> Result<()> {
    let mut first_error = None;
    for (index, hop) in hops.iter().enumerate().rev() {
        if hop.is_closed() {
            continue;
        }
        if let Err(e) = hop
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Failed to disconnect hop {}: {}", index, e);
            first_error.get_or_insert_with(|| {
                SshError::connection(format!("Failed to disconnect hop {}: {}", index, e))
            });
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Disconnect the hops of a tunnel that failed to open.
async fn release(hops: &[Arc<SessionHandle>]) {
    if let Err(e) = disconnect_all(hops).await {
        warn!("Failed to release partially opened tunnel: {}", e);
    }
}

/// Forwards `local_host:local_port` to `remote_host:remote_port` through the
/// hops of a route.
///
/// The first hop is reached over TCP and every later hop through a
/// `direct-tcpip` channel of the previous one. The local listener forwards
/// each accepted connection through the last hop. State is guarded by an
/// async mutex, so concurrent intents on one manager run one at a time.
pub struct DefaultTunnelConnectionManager {
    spec: TunnelSpec,
    route: Route,
    sessions: Arc<dyn SessionFactory>,
    state: Mutex<State>,
}

impl DefaultTunnelConnectionManager {
    /// Fails when the spec's route cannot be parsed.
    pub fn new(spec: TunnelSpec, sessions: Arc<dyn SessionFactory>) -> Result<Self> {
        let route = spec.route()?;
        Ok(Self {
            spec,
            route,
            sessions,
            state: Mutex::new(State::Unopened),
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether the tunnel is open and its sessions are alive.
    pub async fn is_open(&self) -> bool {
        matches!(&*self.state.lock().await, State::Open(open) if open.is_alive())
    }

    async fn establish(&self) -> Result<OpenTunnel> {
        let config = self.sessions.client_config();
        let mut hops: Vec<Arc<SessionHandle>> = Vec::with_capacity(self.route.hops().len());

        for hop in self.route.hops() {
            let connected = self
                .sessions
                .connect_with(config.clone(), hop, hops.last().map(Arc::as_ref))
                .await;
            match connected {
                Ok(handle) => hops.push(Arc::new(handle)),
                Err(e) => {
                    release(&hops).await;
                    return Err(e);
                }
            }
        }

        let bound = bind_listener(self.spec.local_host(), self.spec.local_port())
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));
        let (local_addr, listener) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                release(&hops).await;
                return Err(e);
            }
        };

        let Some(last) = hops.last().cloned() else {
            return Err(SshError::connection(format!(
                "Route '{}' has no hops",
                self.route
            )));
        };

        let cancel = CancellationToken::new();
        let forwarding = spawn_forwarding(
            listener,
            last,
            self.spec.remote_host().to_string(),
            self.spec.remote_port(),
            cancel.clone(),
        );

        Ok(OpenTunnel {
            hops,
            cancel,
            forwarding,
            local_addr,
        })
    }

    async fn open_locked(&self, state: &mut State) -> Result<()> {
        debug!("Opening tunnel {}", self.spec.expression());
        let open = self.establish().await?;
        info!(
            "SSH tunnel established: {} -> {} -> {}:{}",
            open.local_addr,
            self.route,
            self.spec.remote_host(),
            self.spec.remote_port()
        );
        *state = State::Open(open);
        Ok(())
    }
}

#[async_trait]
impl TunnelConnectionManager for DefaultTunnelConnectionManager {
    async fn open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Open(_)) {
            return Ok(());
        }
        self.open_locked(&mut state).await
    }

    async fn ensure_open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(open) if open.is_alive() => {
                *state = State::Open(open);
                return Ok(());
            }
            State::Open(open) => {
                debug!("Tunnel {} is no longer alive, reopening", self.spec.expression());
                if let Err(e) = open.shutdown().await {
                    warn!("Failed to tear down dead tunnel: {}", e);
                }
            }
            State::Unopened => *state = State::Unopened,
            State::Closed => {}
        }
        self.open_locked(&mut state).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(open) => {
                debug!("Closing tunnel {}", self.spec.expression());
                open.shutdown().await
            }
            previous => {
                debug!(
                    "Tunnel {} is {}, nothing to close",
                    self.spec.expression(),
                    previous.name()
                );
                *state = previous;
                Ok(())
            }
        }
    }

    fn tunnel(&self, remote_host: &str, remote_port: u16) -> Option<Tunnel> {
        (self.spec.remote_host() == remote_host && self.spec.remote_port() == remote_port)
            .then(|| Tunnel::from(&self.spec))
    }

    fn spec(&self) -> &TunnelSpec {
        &self.spec
    }
}

impl Drop for DefaultTunnelConnectionManager {
    fn drop(&mut self) {
        if let State::Open(open) = self.state.get_mut() {
            open.cancel.cancel();
        }
    }
}
