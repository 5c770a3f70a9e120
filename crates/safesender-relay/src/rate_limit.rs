//! Per-sender send throttling

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{RelayError, Result};

/// Outcome of a rate limit check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// Send accepted and recorded
    Allow,
    /// Too soon since the last accepted send
    Reject {
        /// Whole seconds until the next send is allowed
        retry_after_secs: u64,
    },
}

impl RateDecision {
    /// Check if the send is allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }

    /// Convert into a `Result`, mapping rejection to `RateLimited`
    pub fn into_result(self) -> Result<()> {
        match self {
            RateDecision::Allow => Ok(()),
            RateDecision::Reject { retry_after_secs } => {
                Err(RelayError::RateLimited { retry_after_secs })
            }
        }
    }
}

/// Send history for one key
#[derive(Clone, Debug)]
struct RateWindow {
    last_accepted: DateTime<Utc>,
    rejected_attempts: u32,
}

/// Enforces a minimum gap between accepted sends per key.
///
/// The check and the update run under the map's per-entry lock, so two
/// simultaneous sends for one key cannot both pass.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    min_interval: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given minimum gap
    pub fn new(min_interval: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            min_interval,
        }
    }

    /// Decide whether `key` may send at `now`, recording the attempt
    pub fn check_and_record(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        if self.min_interval <= Duration::zero() {
            return RateDecision::Allow;
        }

        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(RateWindow {
                    last_accepted: now,
                    rejected_attempts: 0,
                });
                RateDecision::Allow
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                let elapsed = now - window.last_accepted;
                if elapsed >= self.min_interval {
                    window.last_accepted = now;
                    window.rejected_attempts = 0;
                    return RateDecision::Allow;
                }

                window.rejected_attempts = window.rejected_attempts.saturating_add(1);
                // a clock that stepped backwards never asks for more than one interval
                let remaining = (self.min_interval - elapsed).min(self.min_interval);
                let retry_after_secs = ceil_secs(remaining);
                debug!(
                    "Send rejected, {} attempts inside window, retry in {}s",
                    window.rejected_attempts, retry_after_secs
                );
                RateDecision::Reject { retry_after_secs }
            }
        }
    }

    /// Drop windows that can no longer reject anything
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now - window.last_accepted < self.min_interval);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let millis = d.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}
