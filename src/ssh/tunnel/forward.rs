//! Local port forwarding over the last hop of a tunnel.
//!
//! A TCP listener is bound on the tunnel's local endpoint. Every accepted
//! connection gets its own `direct-tcpip` channel (RFC 4254) to the remote
//! destination, opened on the last hop's session, and bytes are copied in
//! both directions until both sides have closed. A half-close is passed on.
//!
//! The accept loop and every connection task stop when the tunnel's
//! [`CancellationToken`] is cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::ssh::error::{Result, SshError};
use crate::ssh::session::SessionHandle;

/// Bind the local end of a tunnel.
pub(crate) async fn bind_listener(local_host: &str, local_port: u16) -> Result<TcpListener> {
    TcpListener::bind((local_host, local_port)).await.map_err(|e| {
        SshError::connection(format!(
            "Failed to bind to local port {}:{}: {}",
            local_host, local_port, e
        ))
    })
}

/// Accept connections on `listener` and forward each one to
/// `remote_host:remote_port` through `handle`.
pub(crate) fn spawn_forwarding(
    listener: TcpListener,
    handle: Arc<SessionHandle>,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(local_addr) = listener.local_addr() {
            debug!(
                "Port forwarding active on {} -> {}:{}",
                local_addr, remote_host, remote_port
            );
        }

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((local_stream, client_addr)) => {
                    debug!("New connection from {} to forwarded port", client_addr);

                    let handle = handle.clone();
                    let remote_host = remote_host.clone();
                    let cancel = cancel.clone();

                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!("Forwarded connection from {} cancelled", client_addr);
                            }
                            result = handle_forward_connection(
                                &handle,
                                local_stream,
                                client_addr,
                                &remote_host,
                                remote_port,
                            ) => {
                                if let Err(e) = result {
                                    debug!("Port forwarding connection error: {}", e);
                                }
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    break;
                }
            }
        }

        debug!("Port forwarding to {}:{} stopped", remote_host, remote_port);
    })
}

async fn handle_forward_connection(
    handle: &SessionHandle,
    mut local_stream: TcpStream,
    client_addr: SocketAddr,
    remote_host: &str,
    remote_port: u16,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_tcpip(
            remote_host,
            remote_port as u32,
            client_addr.ip().to_string(),
            client_addr.port() as u32,
        )
        .await
        .map_err(|e| {
            SshError::connection(format!(
                "Failed to open direct-tcpip channel to {}:{}: {}",
                remote_host, remote_port, e
            ))
        })?;

    let mut channel_stream = channel.into_stream();

    // EOF on one side shuts down the write half of the other; the copy ends
    // once both directions have finished.
    match tokio::io::copy_bidirectional(&mut local_stream, &mut channel_stream).await {
        Ok((sent, received)) => debug!(
            "Port forwarding connection from {} closed ({} bytes out, {} bytes in)",
            client_addr, sent, received
        ),
        Err(e) => debug!("Port forwarding connection from {} ended: {}", client_addr, e),
    }
    Ok(())
}
