//! Hop connection and the session timeout decorator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::ssh::auth::{AuthChain, AuthStrategy};
use crate::ssh::error::{Result, SshError};
use crate::ssh::route::Hop;
use crate::ssh::settings::DEFAULT_LOCALHOST;

use super::{SessionFactory, SessionHandle, TunnelClientHandler, build_client_config};

/// Connects to hops with a fixed set of identities and host key policy.
pub struct DefaultSessionFactory {
    username: String,
    hostname: String,
    port: u16,
    known_hosts: Option<Arc<PathBuf>>,
    strict_host_key_checking: bool,
    auth: AuthChain,
    connect_timeout: Duration,
}

impl DefaultSessionFactory {
    pub fn new(username: impl Into<String>, port: u16, auth: AuthChain) -> Self {
        Self {
            username: username.into(),
            hostname: DEFAULT_LOCALHOST.to_string(),
            port,
            known_hosts: None,
            strict_host_key_checking: true,
            auth,
            connect_timeout: Duration::from_secs(crate::ssh::config::DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_known_hosts(mut self, known_hosts: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(Arc::new(known_hosts.into()));
        self
    }

    pub fn with_strict_host_key_checking(mut self, strict: bool) -> Self {
        self.strict_host_key_checking = strict;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Upper bound for establishing one hop, handshake and authentication included.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn is_strict_host_key_checking(&self) -> bool {
        self.strict_host_key_checking
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn establish(
        &self,
        config: Arc<client::Config>,
        hop: &Hop,
        port: u16,
        via: Option<&SessionHandle>,
    ) -> Result<SessionHandle> {
        let handler = TunnelClientHandler::new(
            hop.host(),
            port,
            self.known_hosts.clone(),
            self.strict_host_key_checking,
        );

        let mut handle = match via {
            None => client::connect(config, (hop.host(), port), handler)
                .await
                .map_err(|e| {
                    SshError::connection(format!(
                        "Failed to connect to {}:{}: {}",
                        hop.host(),
                        port,
                        e
                    ))
                })?,
            Some(previous) => {
                let channel = previous
                    .channel_open_direct_tcpip(hop.host(), port as u32, "127.0.0.1", 0)
                    .await
                    .map_err(|e| {
                        SshError::connection(format!(
                            "Failed to open direct-tcpip channel to {}:{}: {}",
                            hop.host(),
                            port,
                            e
                        ))
                    })?;
                client::connect_stream(config, channel.into_stream(), handler)
                    .await
                    .map_err(|e| {
                        SshError::connection(format!(
                            "Failed to connect via stream to {}:{}: {}",
                            hop.host(),
                            port,
                            e
                        ))
                    })?
            }
        };

        let username = hop.user().unwrap_or(&self.username);
        let authenticated = self.auth.authenticate(&mut handle, username).await?;

        if !authenticated {
            return Err(SshError::connection(format!(
                "Authentication failed for {}@{}:{}",
                username,
                hop.host(),
                port
            )));
        }

        Ok(handle)
    }
}

#[async_trait]
impl SessionFactory for DefaultSessionFactory {
    fn username(&self) -> &str {
        &self.username
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn client_config(&self) -> Arc<client::Config> {
        build_client_config(None)
    }

    async fn connect_with(
        &self,
        config: Arc<client::Config>,
        hop: &Hop,
        via: Option<&SessionHandle>,
    ) -> Result<SessionHandle> {
        let port = hop.port_or(self.port);
        debug!(
            "Connecting to hop {}:{}{}",
            hop.host(),
            port,
            if via.is_some() { " (via previous hop)" } else { "" }
        );

        tokio::time::timeout(self.connect_timeout, self.establish(config, hop, port, via))
            .await
            .map_err(|_| {
                SshError::connection(format!(
                    "Connection to {}:{} timed out after {:?}",
                    hop.host(),
                    port,
                    self.connect_timeout
                ))
            })?
    }
}

/// Applies a session timeout to another factory.
///
/// The timeout becomes the russh inactivity timeout of every hop session
/// and bounds the establishment of each hop. `None` means sessions never
/// expire.
pub struct DelegatingSessionFactory<F = DefaultSessionFactory> {
    delegate: F,
    timeout: Option<Duration>,
}

impl<F: SessionFactory> DelegatingSessionFactory<F> {
    pub fn new(delegate: F, timeout: Option<Duration>) -> Self {
        Self { delegate, timeout }
    }

    pub fn delegate(&self) -> &F {
        &self.delegate
    }
}

#[async_trait]
impl<F: SessionFactory> SessionFactory for DelegatingSessionFactory<F> {
    fn username(&self) -> &str {
        self.delegate.username()
    }

    fn hostname(&self) -> &str {
        self.delegate.hostname()
    }

    fn port(&self) -> u16 {
        self.delegate.port()
    }

    fn session_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn client_config(&self) -> Arc<client::Config> {
        build_client_config(self.timeout)
    }

    async fn connect_with(
        &self,
        config: Arc<client::Config>,
        hop: &Hop,
        via: Option<&SessionHandle>,
    ) -> Result<SessionHandle> {
        let Some(timeout) = self.timeout else {
            return self.delegate.connect_with(config, hop, via).await;
        };
        tokio::time::timeout(timeout, self.delegate.connect_with(config, hop, via))
            .await
            .map_err(|_| {
                SshError::connection(format!(
                    "Session to {} timed out after {:?}",
                    hop,
                    timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::auth::KeyAuth;
    use crate::ssh::testing::{KEY_1, KEY_2, SshServer};

    fn factory() -> DefaultSessionFactory {
        DefaultSessionFactory::new("deploy", 2222, AuthChain::new().with_key(KeyAuth::load(KEY_1).unwrap()))
    }

    mod default_factory {
        use super::*;

        #[test]
        fn test_reports_identity() {
            let factory = factory().with_hostname("bastion");
            assert_eq!(factory.username(), "deploy");
            assert_eq!(factory.hostname(), "bastion");
            assert_eq!(factory.port(), 2222);
            assert_eq!(factory.session_timeout(), None);
        }

        #[test]
        fn test_defaults() {
            let factory = factory();
            assert_eq!(factory.hostname(), "localhost");
            assert!(factory.is_strict_host_key_checking());
            assert_eq!(factory.connect_timeout(), Duration::from_secs(30));
            assert_eq!(factory.client_config().inactivity_timeout, None);
        }

        #[tokio::test]
        async fn test_unreachable_hop_is_a_connection_error() {
            // Bind then drop to get a local port nobody listens on.
            let port = std::net::TcpListener::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port();
            let factory = factory().with_connect_timeout(Duration::from_secs(5));
            let hop: Hop = format!("127.0.0.1:{}", port).parse().unwrap();

            let err = factory.connect(&hop, None).await.err().unwrap();
            assert!(matches!(err, SshError::Connection(_)));
            assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
        }

        #[tokio::test]
        async fn test_connects_with_accepted_key() {
            let server = SshServer::start(KEY_1).await;
            let factory = server.session_factory(KEY_1);
            let hop: Hop = "127.0.0.1".parse().unwrap();

            let handle = factory.connect(&hop, None).await.unwrap();
            assert!(!handle.is_closed());
            assert_eq!(server.connections(), 1);
        }

        #[tokio::test]
        async fn test_rejected_key_is_an_authentication_failure() {
            let server = SshServer::start(KEY_1).await;
            let factory = server.session_factory(KEY_2);
            let hop: Hop = "127.0.0.1".parse().unwrap();

            let err = factory.connect(&hop, None).await.err().unwrap();
            assert!(matches!(err, SshError::Connection(_)));
            assert_eq!(
                err.to_string(),
                format!("Authentication failed for tester@127.0.0.1:{}", server.port())
            );
        }
    }

    mod delegating_factory {
        use super::*;

        #[test]
        fn test_forwards_identity() {
            let delegating = DelegatingSessionFactory::new(factory(), Some(Duration::from_millis(500)));
            assert_eq!(delegating.username(), "deploy");
            assert_eq!(delegating.port(), 2222);
            assert_eq!(delegating.delegate().hostname(), "localhost");
        }

        #[test]
        fn test_applies_session_timeout() {
            let delegating = DelegatingSessionFactory::new(factory(), Some(Duration::from_millis(500)));
            assert_eq!(delegating.session_timeout(), Some(Duration::from_millis(500)));
            let config = delegating.client_config();
            assert_eq!(config.inactivity_timeout, Some(Duration::from_millis(500)));
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
        }

        #[test]
        fn test_no_timeout_never_expires() {
            let delegating = DelegatingSessionFactory::new(factory(), None);
            let config = delegating.client_config();
            assert_eq!(config.inactivity_timeout, None);
            assert_eq!(config.keepalive_max, 3);
        }
    }
}
