//! Phase progress curves
//!
//! Expansion and dissipation targets are driven by a normalized curve over
//! the phase duration. Hosts may supply a piecewise-linear curve; without
//! one the phase progresses linearly.

use serde::{Deserialize, Serialize};

/// How close to zero a duration can get before the phase is treated as
/// already complete.
const MIN_DURATION: f32 = 1.0e-4;

/// Piecewise-linear curve over normalized time `[0, 1]`.
///
/// Keys are `(time, value)` pairs; sampling clamps to the end keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    keys: Vec<(f32, f32)>,
}

impl Curve {
    /// Create a curve from `(time, value)` keys. Keys are sorted by time.
    pub fn new(mut keys: Vec<(f32, f32)>) -> Self {
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { keys }
    }

    /// Sample the curve at normalized time `t`
    pub fn sample(&self, t: f32) -> f32 {
        let Some(first) = self.keys.first() else {
            return 0.0;
        };
        if t <= first.0 {
            return first.1;
        }
        let last = self.keys[self.keys.len() - 1];
        if t >= last.0 {
            return last.1;
        }
        for pair in self.keys.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t <= t1 {
                let span = t1 - t0;
                if span <= f32::EPSILON {
                    return v1;
                }
                let alpha = (t - t0) / span;
                return v0 + (v1 - v0) * alpha;
            }
        }
        last.1
    }
}

/// Fraction of the growth target reached after `elapsed` seconds.
///
/// Linear ramp without a curve; curve samples are clamped to `[0, 1]`.
/// A (near-)zero duration counts as fully grown.
pub fn growth_fraction(elapsed: f32, duration: f32, curve: Option<&Curve>) -> f32 {
    if duration <= MIN_DURATION {
        return 1.0;
    }
    let alpha = (elapsed / duration).clamp(0.0, 1.0);
    match curve {
        Some(curve) => curve.sample(alpha).clamp(0.0, 1.0),
        None => alpha,
    }
}

/// Fraction of voxels still surviving after `elapsed` seconds of decay.
///
/// Without a curve this falls back to the decreasing ramp `1 - alpha`;
/// supplied curves are expected to be monotonically decreasing from 1 to 0
/// and are clamped to `[0, 1]`.
pub fn decay_fraction(elapsed: f32, duration: f32, curve: Option<&Curve>) -> f32 {
    if duration <= MIN_DURATION {
        return 0.0;
    }
    let alpha = (elapsed / duration).clamp(0.0, 1.0);
    match curve {
        Some(curve) => curve.sample(alpha).clamp(0.0, 1.0),
        None => 1.0 - alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_growth_fallback() {
        assert_eq!(growth_fraction(0.0, 2.0, None), 0.0);
        assert_eq!(growth_fraction(1.0, 2.0, None), 0.5);
        assert_eq!(growth_fraction(5.0, 2.0, None), 1.0);
    }

    #[test]
    fn test_linear_decay_fallback() {
        assert_eq!(decay_fraction(0.0, 2.0, None), 1.0);
        assert_eq!(decay_fraction(1.0, 2.0, None), 0.5);
        assert_eq!(decay_fraction(5.0, 2.0, None), 0.0);
    }

    #[test]
    fn test_zero_duration() {
        assert_eq!(growth_fraction(0.0, 0.0, None), 1.0);
        assert_eq!(decay_fraction(0.0, 0.0, None), 0.0);
    }

    #[test]
    fn test_curve_sampling() {
        let curve = Curve::new(vec![(0.0, 0.0), (0.5, 0.8), (1.0, 1.0)]);
        assert_eq!(curve.sample(0.0), 0.0);
        assert!((curve.sample(0.25) - 0.4).abs() < 1.0e-6);
        assert!((curve.sample(0.75) - 0.9).abs() < 1.0e-6);
        assert_eq!(curve.sample(2.0), 1.0);
    }

    #[test]
    fn test_curve_clamped_in_phase_helpers() {
        // Out-of-range curve values must not push targets past the budget.
        let curve = Curve::new(vec![(0.0, -1.0), (1.0, 3.0)]);
        assert_eq!(growth_fraction(0.0, 1.0, Some(&curve)), 0.0);
        assert_eq!(growth_fraction(1.0, 1.0, Some(&curve)), 1.0);
    }

    #[test]
    fn test_unsorted_keys_are_sorted() {
        let curve = Curve::new(vec![(1.0, 1.0), (0.0, 0.0)]);
        assert!((curve.sample(0.5) - 0.5).abs() < 1.0e-6);
    }
}
