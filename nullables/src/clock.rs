//! Nullable clock: deterministic time for testing.

use provstore_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Safe to share with the
/// provider manager's control loop.
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            current: AtomicU64::new(initial.as_nanos()),
        }
    }

    /// Advance time by `d`.
    pub fn advance(&self, d: Duration) {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        self.current.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Set the time to a specific value, possibly moving it backwards.
    pub fn set(&self, t: Timestamp) {
        self.current.store(t.as_nanos(), Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.current.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_on_request() {
        let clock = NullClock::new(Timestamp::from_nanos(100));
        assert_eq!(clock.now(), Timestamp::from_nanos(100));
        clock.advance(Duration::from_nanos(50));
        assert_eq!(clock.now(), Timestamp::from_nanos(150));
        clock.set(Timestamp::from_nanos(10));
        assert_eq!(clock.now(), Timestamp::from_nanos(10));
    }
}
