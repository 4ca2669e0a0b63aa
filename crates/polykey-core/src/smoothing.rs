//! Single-pole smoothing at a variable control rate.
//!
//! Same difference equation as a one-pole lowpass,
//!
//! ```text
//! y[n] = y[n-1] + (1 - exp(-dt / tau)) * (x[n] - y[n-1])
//! ```
//!
//! but the coefficient is recomputed from each tick's `dt`, since control
//! ticks are driven by a wall-clock timer and never exactly periodic.
//! Used to take sensor jitter out of touch-position modulation.

use libm::expf;

/// One-pole smoother for control-rate signals.
///
/// # Invariants
///
/// - The per-tick coefficient is always in `[0, 1]`.
/// - The first value after [`reset`](Self::reset) passes through unsmoothed.
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    state: f32,
    time_constant: f32,
    primed: bool,
}

impl OnePoleSmoother {
    /// Create a smoother with the given time constant in seconds.
    pub fn new(time_constant: f32) -> Self {
        Self {
            state: 0.0,
            time_constant: time_constant.max(0.0),
            primed: false,
        }
    }

    /// Feed one value observed `delta_time` seconds after the previous one.
    #[inline]
    pub fn process(&mut self, input: f32, delta_time: f32) -> f32 {
        if !self.primed || self.time_constant <= 0.0 {
            self.state = input;
            self.primed = true;
            return self.state;
        }
        let coeff = 1.0 - expf(-delta_time.max(0.0) / self.time_constant);
        self.state += coeff * (input - self.state);
        self.state
    }

    /// Forget history; the next input passes straight through.
    pub fn reset(&mut self) {
        self.state = 0.0;
        self.primed = false;
    }

    /// Jump straight to `value` and treat it as history.
    pub fn set_immediate(&mut self, value: f32) {
        self.state = value;
        self.primed = true;
    }

    /// Current smoothed value.
    #[inline]
    pub fn get(&self) -> f32 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_passes_through() {
        let mut s = OnePoleSmoother::new(0.05);
        assert_eq!(s.process(0.7, 0.01), 0.7);
    }

    #[test]
    fn converges_toward_input() {
        let mut s = OnePoleSmoother::new(0.02);
        s.set_immediate(0.0);
        let mut out = 0.0;
        for _ in 0..100 {
            out = s.process(1.0, 0.01);
        }
        assert!((out - 1.0).abs() < 1e-4, "got {out}");
    }

    #[test]
    fn attenuates_jitter() {
        let mut s = OnePoleSmoother::new(0.05);
        s.set_immediate(0.5);
        let mut max_dev = 0.0f32;
        for i in 0..200 {
            let noisy = if i % 2 == 0 { 0.55 } else { 0.45 };
            max_dev = max_dev.max((s.process(noisy, 0.005) - 0.5).abs());
        }
        assert!(max_dev < 0.01, "jitter not attenuated: {max_dev}");
    }

    #[test]
    fn zero_time_constant_is_passthrough() {
        let mut s = OnePoleSmoother::new(0.0);
        s.process(0.1, 0.01);
        assert_eq!(s.process(0.9, 0.01), 0.9);
    }
}
