use std::time::Duration;

use crate::backoff::Jitter;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Reconnect policy and timeouts for a [`SyncChannel`](crate::SyncChannel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    pub jitter: Jitter,
    /// Consecutive failed attempts tolerated before giving up. `None` retries forever.
    pub max_retries: Option<u32>,
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            multiplier: BACKOFF_MULTIPLIER,
            jitter: Jitter::Equal,
            max_retries: None,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
