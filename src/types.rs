// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Type Definitions

use serde::{Deserialize, Serialize};

// ─── Population State ───────────────────────────────────────────────────────

/// Live sample of the two coupled populations.
///
/// `x` is the resource (circulating supply), `y` the consumer (burn/fee
/// intensity), `t` the simulation clock. Both populations are nonnegative at
/// every observed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationState {
    pub x: f64,
    pub y: f64,
    pub t: f64,
}

impl PopulationState {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, t: 0.0 }
    }

    /// Whether the sample satisfies the nonnegative, finite invariant.
    pub fn is_admissible(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.t.is_finite()
            && self.x >= 0.0 && self.y >= 0.0 && self.t >= 0.0
    }

    /// Resource population has hit the absorbing collapse boundary.
    pub fn is_collapsed(&self) -> bool {
        self.x <= 0.0
    }
}

// ─── Parameters ─────────────────────────────────────────────────────────────

/// Slow-moving coefficients, changed only by governance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralParams {
    /// Consumption efficiency.
    pub beta: f64,
    /// Consumer decay rate.
    pub gamma: f64,
}

impl Default for StructuralParams {
    fn default() -> Self {
        Self { beta: 0.02, gamma: 0.05 }
    }
}

/// Coefficients rewritten by the actuation mapper every control step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlledParams {
    /// Creation rate, always inside `(0, alpha_max)`.
    pub alpha: f64,
    /// Conversion efficiency, always inside the configured band.
    pub delta: f64,
}

/// Full coefficient set handed to the integrator.
///
/// `beta` here is the *effective* value, i.e. structural beta times any
/// emergency multiplier in force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
}

impl ModelParams {
    pub fn new(alpha: f64, beta: f64, gamma: f64, delta: f64) -> Self {
        Self { alpha, beta, gamma, delta }
    }

    pub fn compose(structural: StructuralParams, controlled: ControlledParams) -> Self {
        Self {
            alpha: controlled.alpha,
            beta: structural.beta,
            gamma: structural.gamma,
            delta: controlled.delta,
        }
    }

    /// Same coefficients with beta scaled by `multiplier`.
    pub fn with_beta_multiplier(self, multiplier: f64) -> Self {
        Self { beta: self.beta * multiplier, ..self }
    }

    /// Fastest linear rate in the system; bounds the admissible step size.
    pub fn fastest_rate(&self) -> f64 {
        self.alpha.abs().max(self.gamma.abs())
    }
}

// ─── Control Signal ─────────────────────────────────────────────────────────

/// Raw, unbounded controller output before actuation mapping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlSignal {
    pub u_alpha: f64,
    pub u_delta: f64,
}

impl ControlSignal {
    pub fn new(u_alpha: f64, u_delta: f64) -> Self {
        Self { u_alpha, u_delta }
    }

    /// Squared effort, used by the controller's cost functional.
    pub fn effort(&self) -> f64 {
        self.u_alpha * self.u_alpha + self.u_delta * self.u_delta
    }
}

// ─── Observation ────────────────────────────────────────────────────────────

/// Price differential `P(t) - P*` reported by the oracle collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub price_differential: f64,
    /// Oracle timestamp in milliseconds.
    pub at_ms: u64,
}

// ─── Circuit Breaker Mode ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BreakerMode {
    #[default]
    Normal,
    Emergency,
}

impl BreakerMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Emergency => "EMERGENCY: COLLAPSE RECOVERY",
        }
    }
}

// ─── Control Decision (outbound) ────────────────────────────────────────────

/// How the applied signal for a step was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionSource {
    /// Fresh receding-horizon solution.
    Optimized,
    /// No admissible trajectory; previous signal held.
    HeldInfeasible,
    /// Solve exceeded its budget; previous signal held.
    HeldTimeout,
    /// Latest observation was non-finite; step skipped, previous signal held.
    HeldInvalidObservation,
    /// Forecast could not be built; previous signal held.
    HeldForecastFailure,
}

impl DecisionSource {
    pub fn is_hold(&self) -> bool {
        !matches!(self, Self::Optimized)
    }
}

/// Emitted once per control step to the settlement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub step: u64,
    pub t: f64,
    pub alpha: f64,
    pub delta: f64,
    pub beta_effective: f64,
    pub breaker: BreakerMode,
    pub source: DecisionSource,
    pub signal: ControlSignal,
}

/// Recovered per-step condition; the loop stays live and reports it as data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Anomaly {
    /// Integration clamped a negative or non-finite population.
    NumericDegeneracy,
    /// Controller found no admissible trajectory.
    Infeasible,
    /// Controller exceeded its step budget.
    Timeout,
    /// Pending observation was non-finite.
    InvalidObservation { value: f64 },
    /// Forecast could not be built from the live parameters.
    ForecastFailure,
}

// ─── Diagnostics (read interface) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilityClass {
    Center,
    Unstable,
    Undefined,
}

/// Read-only snapshot for observability tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub step: u64,
    pub version: u64,
    pub x: f64,
    pub y: f64,
    pub t: f64,
    /// `None` when the live parameters are degenerate.
    pub equilibrium: Option<(f64, f64)>,
    pub stability: StabilityClass,
    pub period: Option<f64>,
    pub breaker: BreakerMode,
    pub beta_multiplier: f64,
    pub breaker_trips: u64,
    pub alpha: f64,
    pub delta: f64,
    pub beta_effective: f64,
    pub last_cost: Option<f64>,
    pub last_price_differential: f64,
    pub consecutive_degeneracies: u32,
    pub invariant_drift: f64,
    /// Largest single-step relative drift since the last reset.
    pub invariant_max_step_drift: f64,
    pub invariant_alarm: bool,
    pub last_anomalies: Vec<Anomaly>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admissible_state_rejects_negative_and_nan() {
        assert!(PopulationState::new(5.0, 2.0).is_admissible());
        assert!(PopulationState::new(0.0, 0.0).is_admissible());
        assert!(!PopulationState::new(-0.1, 2.0).is_admissible());
        assert!(!PopulationState::new(f64::NAN, 2.0).is_admissible());
        assert!(!PopulationState::new(1.0, f64::INFINITY).is_admissible());
    }

    #[test]
    fn compose_and_scale_beta() {
        let p = ModelParams::compose(
            StructuralParams { beta: 0.02, gamma: 0.05 },
            ControlledParams { alpha: 0.1, delta: 0.01 },
        );
        assert_eq!(p, ModelParams::new(0.1, 0.02, 0.05, 0.01));
        let scaled = p.with_beta_multiplier(3.0);
        assert!((scaled.beta - 0.06).abs() < 1e-12);
        assert_eq!(scaled.alpha, p.alpha);
        assert!((p.fastest_rate() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn hold_sources() {
        assert!(!DecisionSource::Optimized.is_hold());
        assert!(DecisionSource::HeldTimeout.is_hold());
        assert!(DecisionSource::HeldInvalidObservation.is_hold());
    }
}
