// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Actuation Mapper
//
// Maps unbounded controller output onto admissible coefficients:
//   emission(u)   = alpha_max * sigmoid(u)            in (0, alpha_max)
//   conversion(u) = delta_base + delta_range * tanh(u) in (delta_base -/+ delta_range)
// Both are smooth and saturate with vanishing slope.

use serde::{Deserialize, Serialize};

use crate::types::{ControlSignal, ControlledParams};

/// Inputs beyond this magnitude are pinned before the squashing function so
/// the f64 result stays strictly inside the open range.
const SIGMOID_SATURATION: f64 = 30.0;
const TANH_SATURATION: f64 = 15.0;

/// Logistic function, evaluated without overflow for either sign.
pub fn sigmoid(x: f64) -> f64 {
    let x = x.clamp(-SIGMOID_SATURATION, SIGMOID_SATURATION);
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationMapper {
    pub alpha_max: f64,
    pub delta_base: f64,
    pub delta_range: f64,
}

impl Default for ActuationMapper {
    fn default() -> Self {
        Self { alpha_max: 0.2, delta_base: 0.01, delta_range: 0.005 }
    }
}

impl ActuationMapper {
    pub fn new(alpha_max: f64, delta_base: f64, delta_range: f64) -> Self {
        Self { alpha_max, delta_base, delta_range }
    }

    /// Creation rate for raw signal `u_alpha`.
    pub fn emission(&self, u_alpha: f64) -> f64 {
        self.alpha_max * sigmoid(u_alpha)
    }

    /// Conversion efficiency for raw signal `u_delta`.
    pub fn conversion(&self, u_delta: f64) -> f64 {
        let u = u_delta.clamp(-TANH_SATURATION, TANH_SATURATION);
        self.delta_base + self.delta_range * u.tanh()
    }

    /// Slope of `emission`; zero where the input is pinned.
    pub fn emission_derivative(&self, u_alpha: f64) -> f64 {
        if !(u_alpha.abs() <= SIGMOID_SATURATION) {
            return 0.0;
        }
        let s = sigmoid(u_alpha);
        self.alpha_max * s * (1.0 - s)
    }

    /// Slope of `conversion`; zero where the input is pinned.
    pub fn conversion_derivative(&self, u_delta: f64) -> f64 {
        if !(u_delta.abs() <= TANH_SATURATION) {
            return 0.0;
        }
        let th = u_delta.tanh();
        self.delta_range * (1.0 - th * th)
    }

    pub fn actuate(&self, signal: &ControlSignal) -> ControlledParams {
        ControlledParams {
            alpha: self.emission(signal.u_alpha),
            delta: self.conversion(signal.u_delta),
        }
    }

    /// Open interval covered by `conversion`.
    pub fn delta_band(&self) -> (f64, f64) {
        (self.delta_base - self.delta_range, self.delta_base + self.delta_range)
    }

    /// Whether `params` lie strictly inside the admissible ranges.
    pub fn admits(&self, params: &ControlledParams) -> bool {
        let (lo, hi) = self.delta_band();
        params.alpha > 0.0 && params.alpha < self.alpha_max && params.delta > lo && params.delta < hi
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const INPUTS: [f64; 11] = [-1e300, -745.0, -40.0, -3.0, -0.5, 0.0, 0.5, 3.0, 40.0, 745.0, 1e300];

    #[test]
    fn emission_stays_in_open_range() {
        let m = ActuationMapper::default();
        for &u in &INPUTS {
            let a = m.emission(u);
            assert!(a > 0.0 && a < m.alpha_max, "emission({u}) = {a}");
        }
        assert!((m.emission(0.0) - m.alpha_max / 2.0).abs() < 1e-15);
    }

    #[test]
    fn conversion_stays_in_open_band() {
        let m = ActuationMapper::default();
        let (lo, hi) = m.delta_band();
        for &u in &INPUTS {
            let d = m.conversion(u);
            assert!(d > lo && d < hi, "conversion({u}) = {d}");
        }
        assert_eq!(m.conversion(0.0), m.delta_base);
    }

    #[test]
    fn conversion_is_odd_about_base() {
        let m = ActuationMapper::default();
        for &u in &[0.1, 0.7, 2.0, 5.0] {
            let up = m.conversion(u) - m.delta_base;
            let down = m.conversion(-u) - m.delta_base;
            assert!((up + down).abs() < 1e-15);
        }
    }

    #[test]
    fn mappings_are_monotone() {
        let m = ActuationMapper::default();
        let mut prev = (m.emission(-10.0), m.conversion(-10.0));
        for i in -99..=100 {
            let u = i as f64 * 0.1;
            let cur = (m.emission(u), m.conversion(u));
            assert!(cur.0 > prev.0);
            assert!(cur.1 >= prev.1);
            prev = cur;
        }
    }

    #[test]
    fn derivatives_match_finite_differences_and_vanish_at_extremes() {
        let m = ActuationMapper::default();
        let h = 1e-6;
        for &u in &[-2.0, -0.3, 0.0, 0.8, 2.5] {
            let fd_a = (m.emission(u + h) - m.emission(u - h)) / (2.0 * h);
            let fd_d = (m.conversion(u + h) - m.conversion(u - h)) / (2.0 * h);
            assert!((fd_a - m.emission_derivative(u)).abs() < 1e-8);
            assert!((fd_d - m.conversion_derivative(u)).abs() < 1e-8);
        }
        assert!(m.emission_derivative(50.0) < 1e-12);
        assert!(m.conversion_derivative(-50.0) < 1e-12);
    }

    #[test]
    fn derivatives_are_zero_where_mappings_are_flat() {
        let m = ActuationMapper::default();
        for &u in &[30.5, 100.0, 1e300, f64::INFINITY] {
            assert_eq!(m.emission(u), m.emission(u + 1.0));
            assert_eq!(m.emission_derivative(u), 0.0);
            assert_eq!(m.emission_derivative(-u), 0.0);
        }
        for &u in &[15.5, 40.0, 1e300, f64::INFINITY] {
            assert_eq!(m.conversion(-u), m.conversion(-u - 1.0));
            assert_eq!(m.conversion_derivative(u), 0.0);
            assert_eq!(m.conversion_derivative(-u), 0.0);
        }
        assert!(m.emission_derivative(29.0) > 0.0);
        assert!(m.conversion_derivative(-14.0) >= 0.0);
        assert_eq!(m.emission_derivative(f64::NAN), 0.0);
    }

    #[test]
    fn admits_only_interior_coefficients() {
        let m = ActuationMapper::default();
        assert!(m.admits(&m.actuate(&ControlSignal::new(1.25, -0.4))));
        assert!(!m.admits(&ControlledParams { alpha: 5.0, delta: 0.01 }));
        assert!(!m.admits(&ControlledParams { alpha: 0.1, delta: m.delta_band().1 }));
    }
}
