//! Timestamp type and clock abstraction.
//!
//! Timestamps are Unix epoch nanoseconds (UTC). They are absolute wall-clock
//! values so a persisted timestamp keeps its meaning across process restarts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::DecodeError;

/// A Unix timestamp in nanoseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    /// Width of the persisted encoding.
    pub const ENCODED_LEN: usize = 8;

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a `SystemTime`, clamping times before the epoch to `EPOCH`.
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(nanos)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Time elapsed since this timestamp, relative to `now`.
    pub fn elapsed_since(&self, now: Timestamp) -> Duration {
        Duration::from_nanos(now.0.saturating_sub(self.0))
    }

    /// Whether more than `window` has passed between this timestamp and `now`.
    pub fn is_expired(&self, window: Duration, now: Timestamp) -> bool {
        self.elapsed_since(now) > window
    }

    pub fn saturating_add(&self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Fixed-width little-endian encoding used for persisted values.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let arr: [u8; Self::ENCODED_LEN] = bytes
            .try_into()
            .map_err(|_| DecodeError::InvalidTimestamp(bytes.len()))?;
        Ok(Self(u64::from_le_bytes(arr)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Source of the current time.
///
/// Production code uses [`SystemClock`]; tests inject a controllable clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
