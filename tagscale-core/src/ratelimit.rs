//! Rate-limited error logging
//!
//! A sustained store outage makes every write fail. Logging each failure
//! would flood the logs, so the writer reports through a [`RateLimitedLog`]
//! that emits at most one line per interval and counts what it swallowed.

use parking_lot::Mutex;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::error;

/// Emits at most one log line per `interval`
#[derive(Debug)]
pub struct RateLimitedLog {
    interval: Duration,
    state: Mutex<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    last_emit: Option<Instant>,
    suppressed: u64,
}

impl RateLimitedLog {
    /// Create a new rate-limited log
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ask to emit now.
    ///
    /// Returns `Some(n)` when the caller may log, `n` being the number of
    /// events suppressed since the previous emission.
    pub fn permit(&self) -> Option<u64> {
        self.permit_at(Instant::now())
    }

    fn permit_at(&self, now: Instant) -> Option<u64> {
        let mut state = self.state.lock();
        let due = match state.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if due {
            state.last_emit = Some(now);
            Some(std::mem::take(&mut state.suppressed))
        } else {
            state.suppressed += 1;
            None
        }
    }

    /// Log an error if the interval allows it
    pub fn error(&self, err: &dyn Display, message: &str) {
        if let Some(suppressed) = self.permit() {
            error!(error = %err, suppressed, "{}", message);
        }
    }
}
