// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Orbit Invariant
//
// The undamped Lotka-Volterra system conserves
//
//   V(X, Y) = delta*X - gamma*ln(X) + beta*Y - alpha*ln(Y)
//
// along every trajectory. Within one control interval the coefficients are
// frozen, so any change of V across the live advance is integration error.
// The monitor accumulates that drift and raises an alarm past a tolerance.

use serde::{Deserialize, Serialize};

use crate::types::{ModelParams, PopulationState};

/// First integral of the system, undefined on the axes.
pub fn first_integral(state: &PopulationState, p: &ModelParams) -> Option<f64> {
    if state.x <= 0.0 || state.y <= 0.0 {
        return None;
    }
    let v = p.delta * state.x - p.gamma * state.x.ln() + p.beta * state.y - p.alpha * state.y.ln();
    v.is_finite().then_some(v)
}

/// Outcome of one drift check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvariantCheck {
    /// Relative drift of V across the interval; `None` when V is undefined.
    pub drift: Option<f64>,
    pub cumulative: f64,
    pub alarm: bool,
}

/// Tracks cumulative relative drift of the first integral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitInvariant {
    cumulative_drift: f64,
    max_step_drift: f64,
    samples: u64,
    tolerance: f64,
    alarm: bool,
}

const DEFAULT_TOLERANCE: f64 = 1e-3;

impl Default for OrbitInvariant {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl OrbitInvariant {
    pub fn new(tolerance: f64) -> Self {
        Self {
            cumulative_drift: 0.0,
            max_step_drift: 0.0,
            samples: 0,
            tolerance,
            alarm: false,
        }
    }

    /// Record the drift of V between `before` and `after` under `params`.
    pub fn record(
        &mut self,
        before: &PopulationState,
        after: &PopulationState,
        params: &ModelParams,
    ) -> InvariantCheck {
        let drift = match (first_integral(before, params), first_integral(after, params)) {
            (Some(v0), Some(v1)) => {
                let scale = v0.abs().max(f64::EPSILON);
                Some((v1 - v0).abs() / scale)
            }
            _ => None,
        };

        if let Some(d) = drift {
            self.samples += 1;
            self.cumulative_drift += d;
            self.max_step_drift = self.max_step_drift.max(d);
            if !self.alarm && self.cumulative_drift > self.tolerance {
                self.alarm = true;
                tracing::warn!(
                    cumulative = self.cumulative_drift,
                    tolerance = self.tolerance,
                    "orbit invariant drift exceeded tolerance"
                );
            }
        }

        InvariantCheck { drift, cumulative: self.cumulative_drift, alarm: self.alarm }
    }

    pub fn cumulative_drift(&self) -> f64 {
        self.cumulative_drift
    }

    pub fn max_step_drift(&self) -> f64 {
        self.max_step_drift
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_alarmed(&self) -> bool {
        self.alarm
    }

    /// Clear accumulated drift, e.g. after a governance change of coefficients.
    pub fn reset(&mut self) {
        self.cumulative_drift = 0.0;
        self.max_step_drift = 0.0;
        self.samples = 0;
        self.alarm = false;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
