//! Average package power from a wrapping cumulative energy counter.
//!
//! RAPL energy counters are free-running and wrap, so the only way to
//! derive an instantaneous-ish Watt figure is to average consumption
//! over the interval between two samples.

use std::time::{Duration, Instant};

/// Samples older than this are discarded: on a loaded system the
/// 32-bit counter can wrap more than once over a long idle gap, which
/// would otherwise surface as a spurious spike.
const STALE_AFTER: Duration = Duration::from_secs(60);

/// Per-package power accumulator.
///
/// Holds the previous `(timestamp, joules)` sample and the counter
/// wraparound modulus in joules.
#[derive(Debug)]
pub struct PowerMeter {
    prev: Option<(Instant, f64)>,
    wrap_joules: f64,
}

impl PowerMeter {
    pub fn new(wrap_joules: f64) -> Self {
        Self {
            prev: None,
            wrap_joules,
        }
    }

    /// Counter modulus in joules.
    pub fn wrap_joules(&self) -> f64 {
        self.wrap_joules
    }

    /// Fold a new sample in and return average watts since the
    /// previous one, clamped into `[0, tdp]`.
    ///
    /// Returns 0 on the first sample, when the previous sample is
    /// stale (>= 60 s old), when the clock went backwards, or when no
    /// time elapsed at all. The new sample is always stored.
    pub fn update(&mut self, now: Instant, energy_j: f64, tdp: f64) -> f64 {
        let prev = self.prev.replace((now, energy_j));

        let Some((prev_ts, prev_j)) = prev else {
            return 0.0;
        };

        // checked_duration_since doubles as the non-monotonicity guard
        let elapsed = match now.checked_duration_since(prev_ts) {
            Some(d) if d < STALE_AFTER => d,
            _ => return 0.0,
        };

        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        let mut delta_j = energy_j - prev_j;
        if delta_j < 0.0 {
            // counter wrapped between the two samples
            delta_j += self.wrap_joules;
        }

        (delta_j / secs).clamp(0.0, tdp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TDP: f64 = 150.0;

    #[test]
    fn test_first_sample_returns_zero() {
        let mut meter = PowerMeter::new(1e6);
        assert_eq!(meter.update(Instant::now(), 500.0, TDP), 0.0);
    }

    #[test]
    fn test_average_over_interval() {
        let mut meter = PowerMeter::new(1e6);
        let t0 = Instant::now();
        meter.update(t0, 100.0, TDP);
        let watts = meter.update(t0 + Duration::from_secs(10), 200.0, TDP);
        assert!((watts - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_wraparound_correction() {
        // e0=5, e=2, modulus 10 => delta = (2-5)+10 = 7 J over 1 s
        let mut meter = PowerMeter::new(10.0);
        let t0 = Instant::now();
        meter.update(t0, 5.0, TDP);
        let watts = meter.update(t0 + Duration::from_secs(1), 2.0, TDP);
        assert!((watts - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_sample_resets_baseline() {
        let mut meter = PowerMeter::new(1e6);
        let t0 = Instant::now();
        meter.update(t0, 100.0, TDP);

        // 60 s later: discard baseline, report 0
        let watts = meter.update(t0 + Duration::from_secs(60), 5000.0, TDP);
        assert_eq!(watts, 0.0);

        // the next sample averages against the reset baseline, not the
        // original one
        let watts = meter.update(t0 + Duration::from_secs(70), 5100.0, TDP);
        assert!((watts - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_backwards_clock_returns_zero() {
        let mut meter = PowerMeter::new(1e6);
        let t0 = Instant::now() + Duration::from_secs(100);
        meter.update(t0, 100.0, TDP);
        assert_eq!(meter.update(t0 - Duration::from_secs(5), 200.0, TDP), 0.0);
    }

    #[test]
    fn test_zero_interval_returns_zero() {
        let mut meter = PowerMeter::new(1e6);
        let t0 = Instant::now();
        meter.update(t0, 100.0, TDP);
        assert_eq!(meter.update(t0, 200.0, TDP), 0.0);
    }

    #[test]
    fn test_clamped_to_tdp() {
        let mut meter = PowerMeter::new(1e6);
        let t0 = Instant::now();
        meter.update(t0, 0.0, TDP);
        let watts = meter.update(t0 + Duration::from_secs(1), 100_000.0, TDP);
        assert_eq!(watts, TDP);
    }

    #[test]
    fn test_never_negative() {
        // A wrap correction larger than needed cannot push below zero
        let mut meter = PowerMeter::new(0.0);
        let t0 = Instant::now();
        meter.update(t0, 5.0, TDP);
        let watts = meter.update(t0 + Duration::from_secs(1), 2.0, TDP);
        assert_eq!(watts, 0.0);
    }
}
