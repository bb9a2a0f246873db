//! Lifecycle generation counter.
//!
//! Every initialize or unload advances the counter. Work started under an
//! older value must not publish its result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use vaultbuild_core::{Error, Result};

/// Shared, monotonically increasing generation number.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Starts at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the new generation.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The latest generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// A guard for work carried out on behalf of `generation`.
    #[must_use]
    pub fn guard(&self, generation: u64) -> GenerationGuard {
        GenerationGuard {
            master: Arc::clone(&self.current),
            generation,
        }
    }
}

/// Checks whether the generation a task runs for is still current.
///
/// # Examples
///
/// ```
/// use vaultbuild_engine::generation::GenerationCounter;
///
/// let counter = GenerationCounter::new();
/// let guard = counter.guard(counter.advance());
/// assert!(guard.check("download").is_ok());
///
/// counter.advance();
/// assert!(guard.check("download").unwrap_err().is_aborted());
/// ```
#[derive(Debug, Clone)]
pub struct GenerationGuard {
    master: Arc<AtomicU64>,
    generation: u64,
}

impl GenerationGuard {
    /// The generation this guard was issued for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer generation has started.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.master.load(Ordering::SeqCst) == self.generation
    }

    /// Fails with an aborted engine error once superseded.
    ///
    /// # Errors
    ///
    /// Returns an aborted [`Error::EngineInitialization`] naming `stage`.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_current() {
            return Ok(());
        }
        Err(Error::aborted(format!(
            "Generation {} superseded by {} during {stage}",
            self.generation,
            self.master.load(Ordering::SeqCst)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.clone().current(), 2);
    }

    #[test]
    fn test_guard_goes_stale() {
        let counter = GenerationCounter::new();
        let old = counter.guard(counter.advance());
        let new = counter.guard(counter.advance());
        assert!(!old.is_current());
        assert!(new.is_current());
        let message = old.check("compile").unwrap_err().to_string();
        assert!(message.contains("Generation 1 superseded by 2 during compile"));
    }
}
