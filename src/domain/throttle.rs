//! Repeat suppression for recurring warnings.

use chrono::{DateTime, Duration, Utc};

/// Decides whether a recurring condition should be logged again.
///
/// A message is let through when nothing was logged yet, when it differs
/// from the last one, or when `again_after` has elapsed since it was last
/// let through.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    again_after: Duration,
    last: Option<(String, DateTime<Utc>)>,
}

impl LogThrottle {
    #[must_use]
    pub fn new(again_after: Duration) -> Self {
        Self {
            again_after,
            last: None,
        }
    }

    /// Record an occurrence at `now` and return whether to log it.
    pub fn should_log(&mut self, message: &str, now: DateTime<Utc>) -> bool {
        let emit = match &self.last {
            None => true,
            Some((last_message, logged_at)) => {
                last_message != message || now - *logged_at > self.again_after
            }
        };
        if emit {
            self.last = Some((message.to_string(), now));
        }
        emit
    }

    /// Forget the last occurrence, e.g. once the condition clears.
    pub fn reset(&mut self) {
        self.last = None;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.last.is_some()
    }
}
