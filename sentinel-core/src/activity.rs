//! Last-input timestamp tracking.
//!
//! The tracker is the only piece of state written from multiple event
//! sources (keyboard handlers, dictation finals, manual actions), so it sits
//! behind a mutex rather than any batching scheme: the coordinator's
//! periodic check must always observe the most recent mark.
//!
//! Cancelling sessions on activity is *not* done here — the tracker is a
//! leaf. `EscalationHandle::record_activity` marks the tracker and then asks
//! the coordinator task (the sole owner of the escalation level) to reset.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Cloneable handle to the shared last-input timestamp.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last_input_at: Arc<Mutex<Instant>>,
}

impl ActivityTracker {
    /// Create a tracker whose last input is "now".
    pub fn new() -> Self {
        Self {
            last_input_at: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record a recognized user input event.
    pub fn mark(&self) {
        *self.last_input_at.lock() = Instant::now();
    }

    /// Duration since the last recorded input.
    pub fn elapsed(&self) -> Duration {
        self.last_input_at.lock().elapsed()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn elapsed_grows_until_marked() {
        let tracker = ActivityTracker::new();
        thread::sleep(Duration::from_millis(20));
        let before = tracker.elapsed();
        assert!(before >= Duration::from_millis(20));

        tracker.mark();
        assert!(tracker.elapsed() < before);
    }

    #[test]
    fn clones_share_the_same_timestamp() {
        let tracker = ActivityTracker::new();
        let clone = tracker.clone();
        thread::sleep(Duration::from_millis(20));
        clone.mark();
        assert!(tracker.elapsed() < Duration::from_millis(20));
    }
}
