//! Crossfade curves and ramp progress math.
//!
//! Every curve pair satisfies `incoming(0) = 0`, `incoming(1) = 1`,
//! `outgoing(0) = 1`, `outgoing(1) = 0`, and both halves are monotonic
//! over `k ∈ [0, 1]`.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use std::time::Duration;

/// Volume curve pair used while ramping between the live and standby slots.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FadeCurve {
    /// `incoming = sin(k·π/2)`, `outgoing = cos(k·π/2)`.
    /// Perceived loudness stays roughly constant through the fade.
    #[default]
    EqualPower,
    /// `incoming = k`, `outgoing = (1 - k)³`.
    /// The outgoing track drops away early for a faster cut-off feel.
    Asymmetric,
}

impl FadeCurve {
    pub fn incoming_gain(self, k: f32) -> f32 {
        let k = k.clamp(0.0, 1.0);
        match self {
            FadeCurve::EqualPower => {
                if k >= 1.0 {
                    1.0
                } else {
                    (k * FRAC_PI_2).sin()
                }
            }
            FadeCurve::Asymmetric => k,
        }
    }

    pub fn outgoing_gain(self, k: f32) -> f32 {
        let k = k.clamp(0.0, 1.0);
        match self {
            // cos(π/2) is ~-4e-8 in f32, pin the end point
            FadeCurve::EqualPower => {
                if k >= 1.0 {
                    0.0
                } else {
                    (k * FRAC_PI_2).cos()
                }
            }
            FadeCurve::Asymmetric => {
                let inv = 1.0 - k;
                inv * inv * inv
            }
        }
    }

    /// Returns `(incoming, outgoing)` gains at progress `k`.
    pub fn gains(self, k: f32) -> (f32, f32) {
        (self.incoming_gain(k), self.outgoing_gain(k))
    }
}

/// Elapsed fraction of a ramp, clamped to `[0, 1]`.
///
/// A zero duration is treated as an already finished ramp.
pub fn ramp_progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CURVES: [FadeCurve; 2] = [FadeCurve::EqualPower, FadeCurve::Asymmetric];

    #[test]
    fn boundary_values_are_exact() {
        for curve in CURVES {
            assert_eq!(curve.gains(0.0), (0.0, 1.0), "{:?} at k=0", curve);
            assert_eq!(curve.gains(1.0), (1.0, 0.0), "{:?} at k=1", curve);
        }
    }

    #[test]
    fn curves_are_monotonic() {
        for curve in CURVES {
            let mut last = curve.gains(0.0);
            for step in 1..=100 {
                let k = step as f32 / 100.0;
                let (incoming, outgoing) = curve.gains(k);
                assert!(incoming >= last.0, "{:?} incoming fell at k={}", curve, k);
                assert!(outgoing <= last.1, "{:?} outgoing rose at k={}", curve, k);
                last = (incoming, outgoing);
            }
        }
    }

    #[test]
    fn equal_power_keeps_total_power() {
        for step in 0..=20 {
            let k = step as f32 / 20.0;
            let (incoming, outgoing) = FadeCurve::EqualPower.gains(k);
            assert_abs_diff_eq!(incoming * incoming + outgoing * outgoing, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn asymmetric_outgoing_drops_faster_than_incoming_rises() {
        let (incoming, outgoing) = FadeCurve::Asymmetric.gains(0.5);
        assert_abs_diff_eq!(incoming, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(outgoing, 0.125, epsilon = 1e-6);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        for curve in CURVES {
            assert_eq!(curve.gains(-0.5), (0.0, 1.0));
            assert_eq!(curve.gains(3.0), (1.0, 0.0));
        }
    }

    #[test]
    fn ramp_progress_clamps_and_handles_zero_duration() {
        let dur = Duration::from_millis(800);
        assert_eq!(ramp_progress(Duration::ZERO, dur), 0.0);
        assert_abs_diff_eq!(ramp_progress(Duration::from_millis(200), dur), 0.25, epsilon = 1e-6);
        assert_eq!(ramp_progress(Duration::from_millis(1600), dur), 1.0);
        assert_eq!(ramp_progress(Duration::from_millis(5), Duration::ZERO), 1.0);
    }

    #[test]
    fn curve_names_round_trip_through_json() {
        let parsed: FadeCurve = serde_json::from_str("\"asymmetric\"").unwrap();
        assert_eq!(parsed, FadeCurve::Asymmetric);
        assert_eq!(serde_json::to_string(&FadeCurve::EqualPower).unwrap(), "\"equalPower\"");
    }
}
