//! Hop authentication seam.

use async_trait::async_trait;

use crate::ssh::error::Result;
use crate::ssh::session::SessionHandle;

/// One way of proving identity to a hop.
///
/// Strategies are shared by every tunnel built from the same settings, hence
/// `Send + Sync`.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// `Ok(false)` when the hop rejected the credentials, `Err` when the
    /// attempt itself failed.
    async fn authenticate(&self, handle: &mut SessionHandle, username: &str) -> Result<bool>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}
