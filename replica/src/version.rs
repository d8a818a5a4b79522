use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter of committed model swaps on this replica.
///
/// It only moves forward, once per successful swap.
#[derive(Debug)]
pub struct VersionTracker {
    current: AtomicU64,
}

impl Default for VersionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionTracker {
    /// Version of the model loaded at startup.
    pub const INITIAL: u64 = 1;

    /// Creates a new `VersionTracker` at `VersionTracker::INITIAL`.
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(Self::INITIAL),
        }
    }

    /// Returns the latest committed version.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Moves to the next version.
    ///
    /// # Returns
    /// The newly reached version.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }
}
