// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Equilibrium & Stability Analyzer

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::types::{ModelParams, StabilityClass};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EquilibriumError {
    #[error("degenerate parameters: {reason}")]
    DegenerateParameters { reason: &'static str },
}

// ─── Fixed Point ────────────────────────────────────────────────────────────

/// Nontrivial fixed point `(gamma/delta, alpha/beta)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equilibrium {
    pub x: f64,
    pub y: f64,
}

pub fn equilibrium(p: &ModelParams) -> Result<Equilibrium, EquilibriumError> {
    if p.beta == 0.0 || !p.beta.is_finite() {
        return Err(EquilibriumError::DegenerateParameters { reason: "beta is zero or non-finite" });
    }
    if p.delta == 0.0 || !p.delta.is_finite() {
        return Err(EquilibriumError::DegenerateParameters { reason: "delta is zero or non-finite" });
    }
    Ok(Equilibrium {
        x: p.gamma / p.delta,
        y: p.alpha / p.beta,
    })
}

// ─── Linearization ──────────────────────────────────────────────────────────

/// Complex eigenvalue as `(re, im)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eigenvalue {
    pub re: f64,
    pub im: f64,
}

/// Eigenvalues of the Jacobian at the nontrivial fixed point.
///
/// ```text
/// J = | alpha - beta*Y   -beta*X         |
///     | delta*Y          -gamma + delta*X |
/// ```
pub fn jacobian_eigenvalues(p: &ModelParams) -> Result<[Eigenvalue; 2], EquilibriumError> {
    let eq = equilibrium(p)?;
    let a = p.alpha - p.beta * eq.y;
    let b = -p.beta * eq.x;
    let c = p.delta * eq.y;
    let d = -p.gamma + p.delta * eq.x;

    let trace = a + d;
    let det = a * d - b * c;
    let disc = trace * trace / 4.0 - det;
    let half = trace / 2.0;

    if disc >= 0.0 {
        let r = disc.sqrt();
        Ok([Eigenvalue { re: half + r, im: 0.0 }, Eigenvalue { re: half - r, im: 0.0 }])
    } else {
        let w = (-disc).sqrt();
        Ok([Eigenvalue { re: half, im: w }, Eigenvalue { re: half, im: -w }])
    }
}

const REAL_PART_TOLERANCE: f64 = 1e-12;

/// Classify the nontrivial fixed point from the eigenvalue sign pattern.
///
/// The undamped system with positive coefficients always yields a center.
/// A negative `alpha * gamma` product gives a saddle (unstable); a vanishing
/// one, or degenerate coefficients, leaves the class undefined.
pub fn classify(p: &ModelParams) -> StabilityClass {
    let eig = match jacobian_eigenvalues(p) {
        Ok(e) => e,
        Err(_) => return StabilityClass::Undefined,
    };
    if eig.iter().any(|e| !e.re.is_finite() || !e.im.is_finite()) {
        return StabilityClass::Undefined;
    }
    if eig.iter().any(|e| e.re > REAL_PART_TOLERANCE) {
        return StabilityClass::Unstable;
    }
    if eig.iter().all(|e| e.re.abs() <= REAL_PART_TOLERANCE && e.im.abs() > REAL_PART_TOLERANCE) {
        return StabilityClass::Center;
    }
    StabilityClass::Undefined
}

// ─── Oscillation Timescale ──────────────────────────────────────────────────

/// Local angular frequency `sqrt(alpha * gamma)` of small orbits.
pub fn oscillation_frequency(p: &ModelParams) -> Option<f64> {
    let product = p.alpha * p.gamma;
    if product > 0.0 && product.is_finite() {
        Some(product.sqrt())
    } else {
        None
    }
}

/// One period `2*pi/omega` of the local oscillation.
pub fn period(p: &ModelParams) -> Option<f64> {
    oscillation_frequency(p).map(|w| 2.0 * PI / w)
}

/// Number of control intervals of length `step_span` needed to cover one
/// full period. Falls back to `fallback` when the frequency is undefined.
pub fn horizon_for(p: &ModelParams, step_span: f64, fallback: usize) -> usize {
    match period(p) {
        Some(t) if step_span > 0.0 => (t / step_span).ceil().max(1.0) as usize,
        _ => fallback,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equilibrium_matches_closed_form() {
        for &(a, b, g, d) in &[
            (0.1, 0.02, 0.05, 0.01),
            (1.3, 0.7, 0.2, 0.9),
            (0.004, 3.0, 11.0, 0.25),
        ] {
            let eq = equilibrium(&ModelParams::new(a, b, g, d)).expect("test: nondegenerate");
            assert!((eq.x - g / d).abs() < 1e-12);
            assert!((eq.y - a / b).abs() < 1e-12);
        }
    }

    #[test]
    fn reference_equilibrium_is_five_five() {
        let eq = equilibrium(&ModelParams::new(0.1, 0.02, 0.05, 0.01)).expect("test: eq");
        assert!((eq.x - 5.0).abs() < 1e-12);
        assert!((eq.y - 5.0).abs() < 1e-12);
    }

    #[test]
    fn zero_beta_or_delta_is_degenerate() {
        assert!(matches!(
            equilibrium(&ModelParams::new(0.1, 0.0, 0.05, 0.01)),
            Err(EquilibriumError::DegenerateParameters { .. })
        ));
        assert!(matches!(
            equilibrium(&ModelParams::new(0.1, 0.02, 0.05, 0.0)),
            Err(EquilibriumError::DegenerateParameters { .. })
        ));
        assert_eq!(classify(&ModelParams::new(0.1, 0.0, 0.05, 0.01)), StabilityClass::Undefined);
    }

    #[test]
    fn positive_coefficients_give_center() {
        let p = ModelParams::new(0.1, 0.02, 0.05, 0.01);
        assert_eq!(classify(&p), StabilityClass::Center);
        let eig = jacobian_eigenvalues(&p).expect("test: eig");
        let w = oscillation_frequency(&p).expect("test: omega");
        assert!((eig[0].im.abs() - w).abs() < 1e-12, "imaginary part equals sqrt(alpha*gamma)");
        assert!(eig[0].re.abs() < 1e-12);
    }

    #[test]
    fn negative_growth_gives_saddle() {
        let p = ModelParams::new(-0.1, 0.02, 0.05, 0.01);
        assert_eq!(classify(&p), StabilityClass::Unstable);
        assert!(oscillation_frequency(&p).is_none());
    }

    #[test]
    fn horizon_covers_one_period() {
        let p = ModelParams::new(0.1, 0.02, 0.05, 0.01);
        let t = period(&p).expect("test: period");
        let n = horizon_for(&p, 1.0, 10);
        assert!(n as f64 * 1.0 >= t);
        assert!((n as f64 - 1.0) * 1.0 < t);
        assert_eq!(horizon_for(&ModelParams::new(0.0, 0.02, 0.05, 0.01), 1.0, 10), 10);
    }
}
