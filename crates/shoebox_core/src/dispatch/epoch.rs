//! Generation counter for discarding stale completions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A session generation counter.
///
/// Work that must not outlive a logout or reset captures a token when it is
/// dispatched and checks it before touching shared state.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    /// Creates a counter at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Starts a new generation, invalidating every outstanding token.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Captures the current generation.
    #[must_use]
    pub fn token(&self) -> EpochToken {
        EpochToken {
            epoch: self.clone(),
            captured: self.current(),
        }
    }
}

/// A captured generation.
#[derive(Debug, Clone)]
pub struct EpochToken {
    epoch: Epoch,
    captured: u64,
}

impl EpochToken {
    /// Generation at capture.
    #[must_use]
    pub fn captured(&self) -> u64 {
        self.captured
    }

    /// True while no new generation has started since capture.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.epoch.current() == self.captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_tokens() {
        let epoch = Epoch::new();
        let token = epoch.token();
        assert!(token.is_current());
        assert_eq!(epoch.advance(), 1);
        assert!(!token.is_current());
        assert!(epoch.token().is_current());
        assert_eq!(token.captured(), 0);
    }
}
