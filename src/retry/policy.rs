use std::time::Duration;

/// Default dial attempts per burst.
pub const DEFAULT_MAX_RETRY: u32 = 3;
/// Default pause between supervision cycles.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Reconnect strategy: a burst of back-to-back dials, then a fixed wait.
///
/// There is no exponential growth and no cap on the number of cycles; the
/// session keeps cycling until it is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Dial attempts per burst. Zero is treated as one.
    pub max_retry: u32,
    /// Wait between supervision cycles.
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retry: DEFAULT_MAX_RETRY,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_retry: u32, interval: Duration) -> Self {
        Self {
            max_retry,
            interval,
        }
    }

    /// Attempts actually made per burst.
    pub fn attempts_per_burst(&self) -> u32 {
        self.max_retry.max(1)
    }
}
