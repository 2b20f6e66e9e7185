//! Allowed broadcast hours.

use chrono::{Local, Timelike};

/// Source of the local wall-clock hour
pub trait Clock: Send + Sync {
    /// Current local hour, `0..24`
    fn local_hour(&self) -> u32;
}

/// System clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Half-open window of whole hours, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    /// Create a window from validated bounds
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Whether `hour` falls inside the window
    #[must_use]
    pub const fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }

    /// Whether the clock's current hour falls inside the window
    #[must_use]
    pub fn is_open(&self, clock: &dyn Clock) -> bool {
        self.contains(clock.local_hour())
    }

    /// First allowed hour
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// First hour after the window
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }
}
