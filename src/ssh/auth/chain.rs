//! Ordered list of identities offered to a hop.

use async_trait::async_trait;
use tracing::debug;

use crate::ssh::error::{Result, SshError};
use crate::ssh::session::SessionHandle;

use super::KeyAuth;
use super::traits::AuthStrategy;

/// Offers every strategy in insertion order until one is accepted.
///
/// A rejected or failed strategy does not stop the chain. When every
/// strategy was rejected the result is `Ok(false)`; when any of them failed
/// the last failure is reported. An empty chain is an error.
#[derive(Default)]
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a loaded private key.
    pub fn with_key(self, key: KeyAuth) -> Self {
        self.with_strategy(Box::new(key))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn AuthStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(&self, handle: &mut SessionHandle, username: &str) -> Result<bool> {
        if self.strategies.is_empty() {
            return Err(SshError::connection(format!(
                "No identities configured for {}",
                username
            )));
        }

        let mut failure = None;
        for strategy in &self.strategies {
            match strategy.authenticate(handle, username).await {
                Ok(true) => {
                    debug!("{} accepted {} authentication", username, strategy.name());
                    return Ok(true);
                }
                Ok(false) => {
                    debug!("{} rejected {} authentication", username, strategy.name());
                }
                Err(e) => {
                    debug!("{} authentication for {} errored: {}", strategy.name(), username, e);
                    failure = Some(e);
                }
            }
        }

        failure.map_or(Ok(false), Err)
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
