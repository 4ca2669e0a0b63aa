//! Time sources shared by the note-event path and the control loop.
//!
//! Trigger timestamps, release starts, and control-tick times must come from
//! the same clock or elapsed-time arithmetic across the two contexts is
//! meaningless. Everything takes a [`SharedClock`] for that reason.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic time source in seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Seconds since an arbitrary, fixed origin.
    fn now(&self) -> f64;
}

/// Clock handle shared between contexts.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time from [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Convenience constructor for a [`SharedClock`].
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for deterministic tests and scripted scenarios.
///
/// The time is stored as `f64` bits in an atomic so a test thread can move
/// time while a scheduler thread reads it.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Convenience constructor returning both the concrete handle (to move
    /// time) and the shared trait object (to hand to the engine).
    pub fn shared(start: f64) -> (Arc<ManualClock>, SharedClock) {
        let clock = Arc::new(Self::new(start));
        let shared: SharedClock = clock.clone();
        (clock, shared)
    }

    /// Jump to an absolute time.
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// Move time forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        let now = self.now();
        self.set(now + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let (clock, shared) = ManualClock::shared(1.5);
        assert_eq!(shared.now(), 1.5);
        clock.advance(0.25);
        assert_eq!(shared.now(), 1.75);
        clock.set(10.0);
        assert_eq!(shared.now(), 10.0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
