//! Decaying error budget around scheduler ticks

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRY: u32 = 5;
pub const DEFAULT_TIME_BEFORE_RETRY_SECS: u64 = 30;

/// Leaky-bucket error counter.
///
/// Each error first drains `floor(elapsed / (time_before_retry + 1))` from the
/// count, then adds one. The error is handed back once the count exceeds
/// `max_retry`.
#[derive(Debug, Clone)]
pub struct Retry {
    max_retry: u32,
    time_before_retry_secs: u64,
    count: u32,
    last_error_at: DateTime<Utc>,
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY, DEFAULT_TIME_BEFORE_RETRY_SECS)
    }
}

impl Retry {
    pub fn new(max_retry: u32, time_before_retry_secs: u64) -> Self {
        Self::starting_at(max_retry, time_before_retry_secs, Utc::now())
    }

    /// Retry whose decay reference starts at `start`
    pub fn starting_at(max_retry: u32, time_before_retry_secs: u64, start: DateTime<Utc>) -> Self {
        Self {
            max_retry,
            time_before_retry_secs,
            count: 0,
            last_error_at: start,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Record an error now; `Err` hands it back when the budget is spent
    pub fn retry<E>(&mut self, error: E) -> Result<(), E> {
        self.retry_at(error, Utc::now())
    }

    pub fn retry_at<E>(&mut self, error: E, now: DateTime<Utc>) -> Result<(), E> {
        let elapsed = (now - self.last_error_at).num_seconds().max(0) as u64;
        let decay = elapsed / (self.time_before_retry_secs + 1);
        let decay = u32::try_from(decay).unwrap_or(u32::MAX);

        self.count = self.count.saturating_sub(decay) + 1;
        self.last_error_at = now;
        debug!(elapsed, decay, count = self.count, "Retry::retry_at: counted error");

        if self.count > self.max_retry {
            warn!(count = self.count, max_retry = self.max_retry, "Retry budget exhausted");
            return Err(error);
        }
        Ok(())
    }
}
