//! Cooperative build cancellation.

use crate::error::{Error, Result};
use tokio_util::sync::CancellationToken as Inner;

/// One-shot cancellation flag checked at pipeline checkpoints.
///
/// Cancellation is cooperative: setting the flag never interrupts running
/// work, it only makes the next [`check`](Self::check) fail.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(token.check().is_ok());
/// token.cancel();
/// assert!(token.check().unwrap_err().is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Inner,
}

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Fails with [`Error::BuildCancelled`] if the flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildCancelled`] after cancellation.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::BuildCancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the flag is set.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}
