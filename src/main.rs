#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use dotenv::dotenv;
use tracing::info;

use ssh_tunnelable::ssh::config::{mapper_from_env, resolve_local_port, resolve_remote};
use ssh_tunnelable::ssh::tunnel::{
    DefaultTunnelConnectionManagerFactory, TunnelConnectionManagerFactory,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let settings = mapper_from_env()?.to_settings()?;

    let (remote_host, remote_port) = resolve_remote(None)?;
    let local_port = resolve_local_port(None);
    let local_host = settings.local_host().to_string();

    let factory = DefaultTunnelConnectionManagerFactory::from_settings(settings);
    let manager = factory.create_with_local(&local_host, local_port, &remote_host, remote_port)?;
    manager.open().await?;

    let assigned = manager
        .tunnel(&remote_host, remote_port)
        .map(|tunnel| tunnel.assigned_local_port)
        .unwrap_or(local_port);
    info!(
        "Forwarding {}:{} -> {}:{}, press Ctrl-C to stop",
        local_host, assigned, remote_host, remote_port
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down tunnel");
    manager.close().await?;

    Ok(())
}
