//! Shared monotonic timeline for producers and the watchdog

use std::time::Duration;
use tokio::time::Instant;

/// Seconds elapsed since the clock was created.
///
/// Producers stamp events with [`TwinClock::now`] and the inactivity
/// watchdog reads the same clock, so both compare on one timeline. Built on
/// `tokio::time::Instant`, which follows paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct TwinClock {
    origin: Instant,
}

impl TwinClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for TwinClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = TwinClock::new();
        assert_eq!(clock.now(), 0.0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!((clock.now() - 1.5).abs() < 1e-9);
    }
}
