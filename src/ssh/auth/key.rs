//! Private key file SSH authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys;
use tracing::debug;

use crate::ssh::error::{Result, SshError};
use crate::ssh::session::SessionHandle;

use super::traits::AuthStrategy;

/// Private key authentication strategy.
///
/// The key is read from disk once, by [`KeyAuth::load`], so that a missing or
/// unreadable identity fails when the session factory is built rather than on
/// the first hop. Passphrase-protected keys are not supported.
pub struct KeyAuth {
    key_path: PathBuf,
    key: Arc<keys::PrivateKey>,
}

impl KeyAuth {
    /// Load the private key at `key_path`.
    pub fn load(key_path: impl Into<PathBuf>) -> Result<Self> {
        let key_path = key_path.into();
        let key = keys::load_secret_key(&key_path, None).map_err(|e| {
            debug!("Failed to load private key from {:?}: {}", key_path, e);
            SshError::Key(e)
        })?;
        Ok(Self::new(key_path, Arc::new(key)))
    }

    /// Use an already loaded key. `key_path` is only used for diagnostics.
    pub fn new(key_path: impl Into<PathBuf>, key: Arc<keys::PrivateKey>) -> Self {
        Self {
            key_path: key_path.into(),
            key,
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(&self, handle: &mut SessionHandle, username: &str) -> Result<bool> {
        // RSA keys are signed with the strongest hash the server accepts
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!(
            "Offering key {:?} to {} (RSA hash: {:?})",
            self.key_path, username, hash_alg
        );

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg);
        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| {
                SshError::connection(format!(
                    "Key authentication failed with {:?}: {}",
                    self.key_path, e
                ))
            })?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
