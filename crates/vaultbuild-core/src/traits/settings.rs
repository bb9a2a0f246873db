use crate::error::Result;
use async_trait::async_trait;

/// Host key/value settings persistence.
///
/// A load returns the last value that was saved successfully.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Loads the stored value, or `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn load(&self) -> Result<Option<serde_json::Value>>;

    /// Replaces the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    async fn save(&self, value: serde_json::Value) -> Result<()>;
}
