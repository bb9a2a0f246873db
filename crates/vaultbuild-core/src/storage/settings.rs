use crate::error::Result;
use crate::traits::SettingsStore;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    value: Mutex<Option<serde_json::Value>>,
}

impl MemorySettings {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn load(&self) -> Result<Option<serde_json::Value>> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, value: serde_json::Value) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }
}
