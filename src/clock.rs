use std::time::Instant;

// Time source for the rate limiters, swappable in tests
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

// Monotonic clock backed by Instant::now()
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
