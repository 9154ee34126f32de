//! Monotonic millisecond timestamps.

use tokio::time::Instant;

/// Milliseconds since an arbitrary, fixed origin.
pub type Timestamp = u64;

/// Monotonic clock counting milliseconds from its creation.
///
/// Backed by [`tokio::time::Instant`], so it follows paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Starts a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the milliseconds elapsed since the clock was created.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
