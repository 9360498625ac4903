//! Bounded exponential backoff for optimistic-concurrency retries.

use std::time::Duration;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Tracks retries of one logical operation.
#[derive(Debug)]
pub(crate) struct Backoff {
    attempt: u32,
    max_retries: u32,
    delay: Duration,
}

impl Backoff {
    pub(crate) const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_retries,
            delay: initial_delay,
        }
    }

    /// Attempts made so far, counting the first one.
    pub(crate) const fn attempts(&self) -> u32 {
        self.attempt + 1
    }

    /// Sleep before the next attempt. Returns `false` once retries are used up.
    pub(crate) async fn wait(&mut self) -> bool {
        if self.attempt >= self.max_retries {
            return false;
        }
        self.attempt += 1;
        tokio::time::sleep(self.delay).await;
        // Exponential backoff with cap
        self.delay = (self.delay * 2).min(MAX_BACKOFF);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let mut backoff = Backoff::new(2, Duration::from_millis(10));
        assert_eq!(backoff.attempts(), 1);
        assert!(backoff.wait().await);
        assert!(backoff.wait().await);
        assert_eq!(backoff.attempts(), 3);
        assert!(!backoff.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_doubles_up_to_cap() {
        let mut backoff = Backoff::new(10, Duration::from_millis(200));
        backoff.wait().await;
        assert_eq!(backoff.delay, Duration::from_millis(400));
        backoff.wait().await;
        assert_eq!(backoff.delay, MAX_BACKOFF);
    }
}
