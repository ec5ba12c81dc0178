use rand::Rng;
use std::time::Duration;

use crate::config::ChannelConfig;

/// How much randomness to mix into each reconnect delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Exactly the exponential delay
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

/// Exponential reconnect delays, capped, with optional jitter and an optional attempt limit
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    jitter: Jitter,
    max_retries: Option<u32>,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            max: config.max_backoff,
            multiplier: config.multiplier.max(1),
            jitter: config.jitter,
            max_retries: config.max_retries,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the attempt limit is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| self.attempts >= max) {
            return None;
        }
        let base = self.capped(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(self.jittered(base))
    }

    /// Called after a successful connection
    pub fn reset(&mut self) { self.attempts = 0; }

    pub fn attempts(&self) -> u32 { self.attempts }

    fn capped(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.initial.checked_mul(factor).map_or(self.max, |delay| delay.min(self.max))
    }

    fn jittered(&self, base: Duration) -> Duration {
        let millis = base.as_millis() as u64;
        match self.jitter {
            Jitter::None => base,
            Jitter::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}
