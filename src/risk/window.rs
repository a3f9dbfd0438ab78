//! Sliding-window submission counter.
//!
//! The original design coordinated per-minute order counts through shared
//! mutable dictionaries; here the window is an explicit object with its own
//! lock, exposed only through the risk gate.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Counts events inside a trailing window, pruning history beyond a
/// retention horizon on every access.
#[derive(Debug)]
pub struct SlidingWindowCounter {
    events: Mutex<VecDeque<DateTime<Utc>>>,
    window: Duration,
    retention: Duration,
}

impl SlidingWindowCounter {
    /// A counter over `window_secs`, keeping `retention_secs` of history.
    pub fn new(window_secs: i64, retention_secs: i64) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            window: Duration::seconds(window_secs),
            retention: Duration::seconds(retention_secs),
        }
    }

    /// One-minute window, five minutes of retained history.
    pub fn per_minute() -> Self {
        Self::new(60, 300)
    }

    /// Record one event at `now`.
    pub fn record(&self, now: DateTime<Utc>) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push_back(now);
        Self::prune(&mut events, now - self.retention);
    }

    /// Number of events inside the trailing window ending at `now`.
    pub fn count(&self, now: DateTime<Utc>) -> usize {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::prune(&mut events, now - self.retention);
        let cutoff = now - self.window;
        events.iter().filter(|t| **t > cutoff).count()
    }

    fn prune(events: &mut VecDeque<DateTime<Utc>>, keep_after: DateTime<Utc>) {
        while events.front().is_some_and(|t| *t < keep_after) {
            events.pop_front();
        }
    }
}
