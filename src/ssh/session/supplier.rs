//! Memoized session factory construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::ssh::auth::{AuthChain, KeyAuth};
use crate::ssh::config::{resolve_connect_timeout, resolve_username};
use crate::ssh::error::{Result, SshError};
use crate::ssh::settings::SshSettings;

use super::{DefaultSessionFactory, DelegatingSessionFactory, SessionFactory};

/// Provides the session factory shared by every tunnel built from one
/// settings object.
pub trait SessionFactorySupplier: Send + Sync {
    fn get(&self) -> Result<Arc<dyn SessionFactory>>;
}

/// Builds a [`DelegatingSessionFactory`] from settings on first use and
/// returns the same instance afterwards.
///
/// Concurrent first calls block until one of them has built the factory; all
/// of them observe that instance. A failed build is not cached.
pub struct DefaultSessionFactorySupplier {
    settings: SshSettings,
    username: Option<String>,
    connect_timeout_secs: Option<u64>,
    factory: OnceCell<Arc<dyn SessionFactory>>,
}

impl DefaultSessionFactorySupplier {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            username: None,
            connect_timeout_secs: None,
            factory: OnceCell::new(),
        }
    }

    /// Login user for hops without `user@`. Defaults to
    /// [`resolve_username`]'s environment lookup.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Per-hop connection timeout. Defaults to `SSH_CONNECT_TIMEOUT` or 30s.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }

    fn build(&self) -> Result<Arc<dyn SessionFactory>> {
        debug!(
            "Building session factory: knownHosts={:?}, identityKeys={}",
            self.settings.known_hosts(),
            self.settings.private_keys_joined()
        );
        let factory = self.try_build().map_err(|e| SshError::SessionConstruction {
            known_hosts: self.settings.known_hosts().unwrap_or_default().to_string(),
            private_keys: self.settings.private_keys_joined(),
            source: Box::new(e),
        })?;
        Ok(Arc::new(factory))
    }

    fn try_build(&self) -> Result<DelegatingSessionFactory> {
        let known_hosts = PathBuf::from(self.settings.known_hosts().unwrap_or_default());
        if !std::fs::metadata(&known_hosts)?.is_file() {
            return Err(SshError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a file", known_hosts),
            )));
        }

        let auth = self
            .settings
            .private_keys()
            .iter()
            .try_fold(AuthChain::new(), |chain, key| {
                KeyAuth::load(key).map(|key| chain.with_key(key))
            })?;

        let port = u16::try_from(self.settings.ssh_port())
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                SshError::configuration(
                    "ssh_port",
                    format!("Invalid SSH port number: {}", self.settings.ssh_port()),
                )
            })?;

        let username = resolve_username(self.username.as_deref()).ok_or_else(|| {
            SshError::configuration("username", "Unable to determine the SSH login user")
        })?;

        let connect_timeout =
            Duration::from_secs(resolve_connect_timeout(self.connect_timeout_secs));

        let factory = DefaultSessionFactory::new(username, port, auth)
            .with_known_hosts(known_hosts)
            .with_strict_host_key_checking(self.settings.is_strict_host_key_checking())
            .with_connect_timeout(connect_timeout);

        Ok(DelegatingSessionFactory::new(
            factory,
            self.settings.session_timeout_duration(),
        ))
    }
}

impl SessionFactorySupplier for DefaultSessionFactorySupplier {
    fn get(&self) -> Result<Arc<dyn SessionFactory>> {
        self.factory.get_or_try_init(|| self.build()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_1: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/id_ed25519_1");
    const KEY_2: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/id_ed25519_2");
    const KNOWN_HOSTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/known_hosts");

    fn settings(known_hosts: &str, private_keys: &str, timeout: i64) -> SshSettings {
        SshSettings::builder()
            .with_ssh_port(2222)
            .with_known_hosts(known_hosts.to_string())
            .with_private_keys(private_keys.to_string())
            .with_session_timeout(timeout)
            .build()
            .unwrap()
    }

    fn supplier(settings: SshSettings) -> DefaultSessionFactorySupplier {
        DefaultSessionFactorySupplier::new(settings)
            .with_username("tester")
            .with_connect_timeout_secs(5)
    }

    mod construction {
        use super::*;

        #[test]
        fn test_builds_delegating_factory_with_timeout() {
            let supplier = supplier(settings(KNOWN_HOSTS, &format!("{},{}", KEY_1, KEY_2), 1000));
            let factory = supplier.get().unwrap();
            assert_eq!(factory.session_timeout(), Some(Duration::from_millis(1000)));
            assert_eq!(factory.username(), "tester");
            assert_eq!(factory.port(), 2222);
            assert_eq!(
                factory.client_config().inactivity_timeout,
                Some(Duration::from_millis(1000))
            );
        }

        #[test]
        fn test_zero_timeout_never_expires() {
            let supplier = supplier(settings(KNOWN_HOSTS, KEY_1, 0));
            assert_eq!(supplier.get().unwrap().session_timeout(), None);
        }

        #[test]
        fn test_missing_known_hosts_names_inputs() {
            let supplier = supplier(settings("/nonexistent/known_hosts", KEY_1, 0));
            let err = supplier.get().err().unwrap();
            assert!(matches!(err, SshError::SessionConstruction { .. }));
            let message = err.to_string();
            assert!(message.contains("/nonexistent/known_hosts"));
            assert!(message.contains(KEY_1));
        }

        #[test]
        fn test_missing_private_key() {
            let keys = format!("{},/nonexistent/id_ed25519", KEY_1);
            let supplier = supplier(settings(KNOWN_HOSTS, &keys, 0));
            let err = supplier.get().err().unwrap();
            assert!(matches!(err, SshError::SessionConstruction { .. }));
            assert!(err.to_string().contains("/nonexistent/id_ed25519"));
        }

        #[test]
        fn test_message_never_contains_key_material() {
            let supplier = supplier(settings("/nonexistent/known_hosts", KEY_1, 0));
            let message = supplier.get().err().unwrap().to_string();
            assert!(!message.contains("PRIVATE KEY"));
        }
    }

    mod memoization {
        use super::*;

        #[test]
        fn test_returns_same_instance() {
            let supplier = supplier(settings(KNOWN_HOSTS, KEY_1, 0));
            let first = supplier.get().unwrap();
            let second = supplier.get().unwrap();
            assert!(Arc::ptr_eq(&first, &second));
        }

        #[test]
        fn test_concurrent_first_use_builds_once() {
            let supplier = supplier(settings(KNOWN_HOSTS, KEY_1, 0));
            let factories: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| supplier.get().unwrap())).collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            for factory in &factories[1..] {
                assert!(Arc::ptr_eq(&factories[0], factory));
            }
        }

        #[test]
        fn test_failed_build_is_retried() {
            let dir = tempfile::tempdir().unwrap();
            let known_hosts = dir.path().join("known_hosts");
            let supplier = supplier(settings(known_hosts.to_str().unwrap(), KEY_1, 0));

            assert!(supplier.get().is_err());
            std::fs::write(&known_hosts, "").unwrap();
            assert!(supplier.get().is_ok());
        }
    }
}
