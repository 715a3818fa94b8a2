// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Dynamics Engine
//
// Fixed-step classical RK4 integration of the Lotka-Volterra pair
//
//   dX/dt =  alpha*X - beta*X*Y
//   dY/dt = -gamma*Y + delta*X*Y
//
// Negative undershoot is clamped to zero and reported as a degeneracy.
// Step requests that violate the stability bound are rejected.

use serde::{Deserialize, Serialize};

use crate::types::{ModelParams, PopulationState};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DynamicsError {
    #[error("integration step must be finite and positive (dt = {dt})")]
    InvalidStep { dt: f64 },

    #[error("step dt = {dt} exceeds stability bound: dt * {rate} > {limit}")]
    StepTooLarge { dt: f64, rate: f64, limit: f64 },

    #[error("state is not admissible (x = {x}, y = {y})")]
    InvalidState { x: f64, y: f64 },
}

/// Recovered numeric failure produced by a single advance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Degeneracy {
    /// Raw RK4 result went below zero; carries the unclamped values.
    NegativeUndershoot { x: f64, y: f64 },
    /// Raw RK4 result was NaN or infinite; previous sample was held.
    NonFinite,
}

/// Result of an advance: the committed state plus any degeneracy met on the way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advance {
    pub state: PopulationState,
    pub degeneracy: Option<Degeneracy>,
}

// ─── Vector Field ───────────────────────────────────────────────────────────

/// Right-hand side of the governing ODE pair at `(x, y)`.
pub fn derivative(x: f64, y: f64, p: &ModelParams) -> (f64, f64) {
    let dx = p.alpha * x - p.beta * x * y;
    let dy = -p.gamma * y + p.delta * x * y;
    (dx, dy)
}

// ─── Integrator ─────────────────────────────────────────────────────────────

/// RK4 integrator with a configured stability bound.
///
/// A step is accepted only when `dt * max(alpha, gamma) <= stability_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Integrator {
    pub stability_limit: f64,
}

impl Default for Integrator {
    fn default() -> Self {
        Self { stability_limit: 0.25 }
    }
}

impl Integrator {
    pub fn new(stability_limit: f64) -> Self {
        Self { stability_limit }
    }

    /// Check `dt` against the stability bound for `params`.
    pub fn check_step(&self, dt: f64, params: &ModelParams) -> Result<(), DynamicsError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(DynamicsError::InvalidStep { dt });
        }
        let rate = params.fastest_rate();
        if dt * rate > self.stability_limit {
            return Err(DynamicsError::StepTooLarge { dt, rate, limit: self.stability_limit });
        }
        Ok(())
    }

    /// Advance one RK4 step of length `dt`.
    pub fn advance(
        &self,
        state: &PopulationState,
        params: &ModelParams,
        dt: f64,
    ) -> Result<Advance, DynamicsError> {
        self.check_step(dt, params)?;
        if !state.is_admissible() {
            return Err(DynamicsError::InvalidState { x: state.x, y: state.y });
        }
        Ok(rk4_step(state, params, dt))
    }

    /// Integrate over `span` using substeps of at most `dt`.
    ///
    /// The final substep is shortened so the clock lands exactly on
    /// `t + span`. The first degeneracy met is reported; integration continues
    /// from the clamped state.
    pub fn advance_span(
        &self,
        state: &PopulationState,
        params: &ModelParams,
        span: f64,
        dt: f64,
    ) -> Result<Advance, DynamicsError> {
        self.check_step(dt, params)?;
        if !span.is_finite() || span < 0.0 {
            return Err(DynamicsError::InvalidStep { dt: span });
        }
        if !state.is_admissible() {
            return Err(DynamicsError::InvalidState { x: state.x, y: state.y });
        }

        let substeps = (span / dt).ceil().max(0.0) as usize;
        let t_end = state.t + span;
        let mut current = *state;
        let mut degeneracy = None;
        for i in 0..substeps {
            let h = if i + 1 == substeps { t_end - current.t } else { dt };
            if h <= 0.0 {
                break;
            }
            let step = rk4_step(&current, params, h);
            current = step.state;
            if degeneracy.is_none() {
                degeneracy = step.degeneracy;
            }
        }
        current.t = t_end;
        Ok(Advance { state: current, degeneracy })
    }
}

fn rk4_step(state: &PopulationState, p: &ModelParams, dt: f64) -> Advance {
    let (x, y) = (state.x, state.y);

    let (k1x, k1y) = derivative(x, y, p);
    let (k2x, k2y) = derivative(x + 0.5 * dt * k1x, y + 0.5 * dt * k1y, p);
    let (k3x, k3y) = derivative(x + 0.5 * dt * k2x, y + 0.5 * dt * k2y, p);
    let (k4x, k4y) = derivative(x + dt * k3x, y + dt * k3y, p);

    let nx = x + dt / 6.0 * (k1x + 2.0 * k2x + 2.0 * k3x + k4x);
    let ny = y + dt / 6.0 * (k1y + 2.0 * k2y + 2.0 * k3y + k4y);
    let t = state.t + dt;

    if !nx.is_finite() || !ny.is_finite() {
        return Advance {
            state: PopulationState { x, y, t },
            degeneracy: Some(Degeneracy::NonFinite),
        };
    }

    if nx < 0.0 || ny < 0.0 {
        return Advance {
            state: PopulationState { x: nx.max(0.0), y: ny.max(0.0), t },
            degeneracy: Some(Degeneracy::NegativeUndershoot { x: nx, y: ny }),
        };
    }

    Advance {
        state: PopulationState { x: nx, y: ny, t },
        degeneracy: None,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
