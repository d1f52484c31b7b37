//! Countdown timers bounding a ceremony

use std::time::Duration;
use tokio::time::Instant;

use gnubby_core::MAX_TIMEOUT_SECS;

/// A deadline that can be queried and cloned
///
/// Built on the tokio clock, so a paused test runtime drives it.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    deadline: Instant,
}

impl CountdownTimer {
    /// Start a timer expiring `timeout` from now
    ///
    /// A timeout past the clock's range falls back to [`MAX_TIMEOUT_SECS`].
    pub fn new(timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_TIMEOUT_SECS));
        Self { deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time left in fractional seconds, as the helper wire format wants it
    pub fn remaining_secs(&self) -> f64 {
        self.remaining().as_secs_f64()
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// An independent timer with the same deadline
    pub fn clone_timer(&self) -> Self {
        self.clone()
    }

    /// Wait until the timer expires
    pub async fn expire(&self) {
        tokio::time::sleep_until(self.deadline).await
    }
}
