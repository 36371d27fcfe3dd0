//! Shared accept/refuse switch for an engine's entry points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable flag that flips once from accepting to stopped.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    stopped: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_accepting(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Stop accepting new work. Returns `true` if this call did the flip.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_shared_between_clones_and_happens_once() {
        let lifecycle = Lifecycle::new();
        let clone = lifecycle.clone();

        assert!(clone.is_accepting());
        assert!(lifecycle.stop());
        assert!(!lifecycle.stop());
        assert!(!clone.is_accepting());
    }
}
