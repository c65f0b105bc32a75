//! Log throttling utility
//!
//! Per-frame conditions (full queues, unknown labels, boxes outside the frame)
//! repeat at the frame rate of a topic. The throttler keeps those warnings to
//! one line per key and interval.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Log throttler that limits how often the same message is logged
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use detection_visualizer::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert!(throttler.should_log("queue_full:camera1"));
/// assert!(!throttler.should_log("queue_full:camera1"));
/// ```
pub struct LogThrottler {
    /// Message key -> last time it was let through
    last_logged: RwLock<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    /// Create a new log throttler with the specified interval
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    /// Create a new log throttler with interval specified in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Check if a message should be logged (not throttled)
    ///
    /// Returns `true` if the message should be logged. If `true` is returned,
    /// the internal timestamp for `key` is updated.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();

        // Fast path under the read lock
        {
            let map = self.last_logged.read();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }

        let mut map = self.last_logged.write();
        // Another thread may have logged between the two locks
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.last_logged.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_logged.read().is_empty()
    }
}

impl Default for LogThrottler {
    /// Five second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_passes() {
        let throttler = LogThrottler::with_secs(60);
        assert!(throttler.should_log("a"));
        assert!(!throttler.should_log("a"));
        // Independent keys are not affected
        assert!(throttler.should_log("b"));
        assert_eq!(throttler.len(), 2);
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let throttler = LogThrottler::new(Duration::ZERO);
        assert!(throttler.should_log("x"));
        assert!(throttler.should_log("x"));
        assert!(!throttler.is_empty());
    }
}
