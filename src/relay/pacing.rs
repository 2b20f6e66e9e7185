//! Pacing between individual sends.
//!
//! Every attempted send is followed by exactly one pause. The pause is long when
//! the success counter has just reached a multiple of `long_pause_every`, and
//! short otherwise. Randomness and sleeping are traits so the dispatch loop
//! can be driven deterministically.

use crate::config::BroadcastConfig;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Source of uniform random draws
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `low..=high`
    fn uniform_inclusive(&self, low: u64, high: u64) -> u64;

    /// Uniform index in `0..len`; `len` must be non-zero
    fn choose_index(&self, len: usize) -> usize;
}

/// Thread-local RNG from `rand`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform_inclusive(&self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        rand::rng().random_range(low..=high)
    }

    fn choose_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::rng().random_range(0..len)
    }
}

/// Suspends the dispatch loop between sends
#[async_trait]
pub trait Pause: Send + Sync {
    /// Wait for `duration`
    async fn pause(&self, duration: Duration);
}

/// Non-blocking sleep on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Which kind of pause follows a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// Regular delay between two messages
    Short,
    /// Extended break every `long_pause_every` successes
    Long,
}

/// A scheduled pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    /// Short or long
    pub kind: PauseKind,
    /// How long to wait
    pub duration: Duration,
}

/// Delay bounds and long-pause period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPlan {
    min_delay: Duration,
    max_delay: Duration,
    long_pause_every: usize,
    long_pause_min: Duration,
    long_pause_max: Duration,
}

impl PacingPlan {
    /// Build the plan from the broadcast config
    #[must_use]
    pub const fn new(config: &BroadcastConfig) -> Self {
        Self {
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            long_pause_every: config.long_pause_every,
            long_pause_min: config.long_pause_min,
            long_pause_max: config.long_pause_max,
        }
    }

    /// Kind of pause that follows an attempt, given the success count so far
    #[must_use]
    pub const fn kind_after(&self, sent: usize) -> PauseKind {
        if sent > 0 && self.long_pause_every > 0 && sent % self.long_pause_every == 0 {
            PauseKind::Long
        } else {
            PauseKind::Short
        }
    }

    /// Draw the pause that follows an attempt
    #[must_use]
    pub fn pace_after(&self, sent: usize, rng: &dyn RandomSource) -> Pace {
        let kind = self.kind_after(sent);
        let (low, high) = match kind {
            PauseKind::Short => (self.min_delay, self.max_delay),
            PauseKind::Long => (self.long_pause_min, self.long_pause_max),
        };
        let millis = rng.uniform_inclusive(as_millis(low), as_millis(high));
        Pace {
            kind,
            duration: Duration::from_millis(millis),
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
