// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Predictive Controller
//
// Receding-horizon controller. Each solve builds an arena of candidate
// control sequences, forward-simulates every candidate through the RK4
// engine under its actuated coefficients, discards trajectories that touch
// the collapse boundary, and reduces the rest to the minimum-cost sequence.
// A short pattern search then refines the winner. Only the first signal of
// the returned plan is meant to be applied.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuation::ActuationMapper;
use crate::dynamics::{DynamicsError, Integrator};
use crate::equilibrium::{self, Equilibrium, EquilibriumError};
use crate::types::{ControlSignal, ModelParams, PopulationState, StructuralParams};

// ─── Settings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcSettings {
    /// Prediction horizon in control intervals; 0 sizes it from the
    /// oscillation period.
    pub horizon_steps: usize,
    pub max_horizon_steps: usize,
    /// Length of one control interval in simulation time.
    pub control_dt: f64,
    /// RK4 substep used while forecasting.
    pub forecast_dt: f64,
    /// Candidate grid covers `[-signal_span, signal_span]` per channel.
    pub signal_span: f64,
    pub grid_levels: usize,
    /// Number of piecewise-constant segments a candidate may vary over.
    pub move_blocks: usize,
    pub refine_iterations: usize,
    pub w_x: f64,
    pub w_y: f64,
    pub w_effort: f64,
    pub w_barrier: f64,
    /// Barrier activates below `collapse_margin * X_eq`.
    pub collapse_margin: f64,
    /// Predicted resource at or below this level is a collapse.
    pub collapse_floor: f64,
    /// Shift of the resource target per unit of normalized price differential.
    pub price_gain: f64,
    pub solve_timeout_ms: u64,
}

impl Default for MpcSettings {
    fn default() -> Self {
        Self {
            horizon_steps: 0,
            max_horizon_steps: 120,
            control_dt: 1.0,
            forecast_dt: 0.1,
            signal_span: 4.0,
            grid_levels: 5,
            move_blocks: 2,
            refine_iterations: 4,
            w_x: 1.0,
            w_y: 0.5,
            w_effort: 0.01,
            w_barrier: 10.0,
            collapse_margin: 0.2,
            collapse_floor: 1e-6,
            price_gain: 0.25,
            solve_timeout_ms: 250,
        }
    }
}

/// Cost functional in force for a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Track the equilibrium, shifted by the price differential, with effort
    /// and collapse-barrier penalties.
    Tracking,
    /// Emergency: only distance from the collapse boundary counts.
    Recovery,
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("no admissible trajectory within the horizon ({evaluated} candidates evaluated)")]
    Infeasible { evaluated: usize },

    #[error("solve cancelled after {evaluated} candidate evaluations")]
    Timeout { evaluated: usize },

    #[error("forecast step rejected: {0}")]
    Dynamics(#[from] DynamicsError),

    #[error("reference equilibrium unavailable: {0}")]
    Equilibrium(#[from] EquilibriumError),
}

// ─── Cancellation ───────────────────────────────────────────────────────────

/// Cooperative cancellation checked between candidate evaluations.
///
/// Trips when the optional deadline passes or when any holder calls
/// [`cancel`](Self::cancel).
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn never() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now. On wasm32 `std` has no clock, so no
    /// deadline is set: the solve is bounded only by the candidate arena and
    /// refine iterations, and only the explicit flag applies.
    pub fn with_timeout(timeout: Duration) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let deadline = Instant::now().checked_add(timeout);
        #[cfg(target_arch = "wasm32")]
        let deadline = {
            let _ = timeout;
            None
        };
        Self { deadline, flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ─── Request / Plan ─────────────────────────────────────────────────────────

/// Owned snapshot handed to a solve; safe to move onto a worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub state: PopulationState,
    pub structural: StructuralParams,
    /// Emergency multiplier applied to structural beta in the forecast.
    pub beta_multiplier: f64,
    pub price_differential: f64,
    /// Normalizes the price differential (the breaker's entry threshold).
    pub observation_scale: f64,
    pub horizon_steps: usize,
    pub objective: Objective,
    /// Previous plan, shifted by one interval to seed this solve.
    pub warm_start: Vec<ControlSignal>,
    /// Signal currently applied.
    pub hold: ControlSignal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// One raw signal per control interval of the horizon.
    pub signals: Vec<ControlSignal>,
    pub cost: f64,
    pub evaluated: usize,
    pub feasible: usize,
}

impl Plan {
    /// Signal to apply now.
    pub fn first(&self) -> ControlSignal {
        self.signals.first().copied().unwrap_or_default()
    }
}

// ─── Controller ─────────────────────────────────────────────────────────────

/// Forecast context shared read-only across candidate evaluations.
struct Forecast {
    state: PopulationState,
    beta_effective: f64,
    gamma: f64,
    target: Equilibrium,
    x_ref: f64,
    objective: Objective,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictiveController {
    mapper: ActuationMapper,
    integrator: Integrator,
    settings: MpcSettings,
}

impl PredictiveController {
    pub fn new(mapper: ActuationMapper, integrator: Integrator, settings: MpcSettings) -> Self {
        Self { mapper, integrator, settings }
    }

    pub fn settings(&self) -> &MpcSettings {
        &self.settings
    }

    pub fn mapper(&self) -> &ActuationMapper {
        &self.mapper
    }

    /// Coefficients at the neutral signal; their fixed point is the target.
    pub fn reference_params(&self, structural: &StructuralParams) -> ModelParams {
        ModelParams::new(
            self.mapper.emission(0.0),
            structural.beta,
            structural.gamma,
            self.mapper.delta_base,
        )
    }

    pub fn reference_equilibrium(&self, structural: &StructuralParams) -> Result<Equilibrium, EquilibriumError> {
        equilibrium::equilibrium(&self.reference_params(structural))
    }

    /// Configured horizon, or one oscillation period at the reference point.
    pub fn resolve_horizon(&self, structural: &StructuralParams) -> usize {
        let s = &self.settings;
        let cap = s.max_horizon_steps.max(1);
        let n = if s.horizon_steps > 0 {
            s.horizon_steps
        } else {
            equilibrium::horizon_for(&self.reference_params(structural), s.control_dt, cap)
        };
        n.clamp(1, cap)
    }

    /// Solve for the minimum-cost admissible control sequence.
    pub fn solve(&self, req: &SolveRequest, cancel: &Cancellation) -> Result<Plan, SolveError> {
        let horizon = req.horizon_steps.max(1);
        let target = self.reference_equilibrium(&req.structural)?;
        let beta_effective = req.structural.beta * req.beta_multiplier;

        // Worst case over the actuation range must satisfy the stability bound.
        let worst = ModelParams::new(self.mapper.alpha_max, beta_effective, req.structural.gamma, self.mapper.delta_base);
        self.integrator.check_step(self.settings.forecast_dt, &worst)?;

        let shift = if req.observation_scale > 0.0 {
            (req.price_differential / req.observation_scale).tanh()
        } else {
            0.0
        };
        let ctx = Forecast {
            state: req.state,
            beta_effective,
            gamma: req.structural.gamma,
            target,
            x_ref: target.x * (1.0 + self.settings.price_gain * shift),
            objective: req.objective,
        };

        let arena = self.candidate_arena(req, horizon);
        let tally = self.score(&ctx, &arena, cancel)?;
        let mut evaluated = tally.evaluated;
        let mut feasible = tally.feasible;
        let (best_idx, mut best_cost) = match tally.best {
            Some(b) => b,
            None => return Err(SolveError::Infeasible { evaluated }),
        };
        let mut best = arena[best_idx].clone();

        let mut step = self.settings.signal_span / (self.settings.grid_levels.max(2) - 1) as f64 / 2.0;
        for _ in 0..self.settings.refine_iterations {
            if cancel.is_cancelled() {
                break;
            }
            let neighbors = self.neighbors(&best, step, horizon);
            let tally = match self.score(&ctx, &neighbors, cancel) {
                Ok(t) => t,
                // The incumbent is already admissible; keep it.
                Err(SolveError::Timeout { evaluated: n }) => {
                    evaluated += n;
                    break;
                }
                Err(e) => return Err(e),
            };
            evaluated += tally.evaluated;
            feasible += tally.feasible;
            match tally.best {
                Some((i, c)) if c < best_cost => {
                    best = neighbors[i].clone();
                    best_cost = c;
                }
                _ => step *= 0.5,
            }
        }

        tracing::debug!(
            horizon,
            evaluated,
            feasible,
            cost = best_cost,
            objective = ?req.objective,
            "mpc solve complete"
        );

        Ok(Plan { signals: best, cost: best_cost, evaluated, feasible })
    }

    // ─── Candidate Generation ───────────────────────────────────────────

    fn candidate_arena(&self, req: &SolveRequest, horizon: usize) -> Vec<Vec<ControlSignal>> {
        let s = &self.settings;
        let levels = grid(s.signal_span, s.grid_levels);
        let blocks = s.move_blocks.clamp(1, horizon);
        let mut arena = Vec::with_capacity(levels.len() * levels.len() * 2 + 2);

        for &ua in &levels {
            for &ud in &levels {
                let u = ControlSignal::new(ua, ud);
                arena.push(vec![u; horizon]);
                if blocks > 1 {
                    // Act in the first block, relax to neutral afterwards.
                    arena.push(
                        (0..horizon)
                            .map(|k| if block_of(k, horizon, blocks) == 0 { u } else { ControlSignal::default() })
                            .collect(),
                    );
                }
            }
        }

        if !req.warm_start.is_empty() {
            let mut shifted: Vec<ControlSignal> = req.warm_start.iter().skip(1).copied().collect();
            let tail = req.warm_start.last().copied().unwrap_or(req.hold);
            shifted.resize(horizon, tail);
            arena.push(shifted);
        }
        arena.push(vec![req.hold; horizon]);
        arena
    }

    /// Axis moves of each block of `seq` by `+/- step`.
    fn neighbors(&self, seq: &[ControlSignal], step: f64, horizon: usize) -> Vec<Vec<ControlSignal>> {
        let blocks = self.settings.move_blocks.clamp(1, horizon);
        let moves = [(step, 0.0), (-step, 0.0), (0.0, step), (0.0, -step)];
        let mut out = Vec::with_capacity(blocks * moves.len());
        for b in 0..blocks {
            for &(da, dd) in &moves {
                let candidate = seq
                    .iter()
                    .enumerate()
                    .map(|(k, u)| {
                        if block_of(k, horizon, blocks) == b {
                            ControlSignal::new(u.u_alpha + da, u.u_delta + dd)
                        } else {
                            *u
                        }
                    })
                    .collect();
                out.push(candidate);
            }
        }
        out
    }

    // ─── Evaluation ─────────────────────────────────────────────────────

    fn score(&self, ctx: &Forecast, arena: &[Vec<ControlSignal>], cancel: &Cancellation) -> Result<Tally, SolveError> {
        let outcomes = evaluate_arena(arena, |seq| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(self.evaluate(ctx, seq))
            }
        });

        let evaluated = outcomes.iter().filter(|o| o.is_some()).count();
        if evaluated < arena.len() {
            return Err(SolveError::Timeout { evaluated });
        }

        let mut best: Option<(usize, f64)> = None;
        let mut feasible = 0;
        for (i, cost) in outcomes.iter().enumerate() {
            if let Some(Some(c)) = cost {
                feasible += 1;
                if best.map_or(true, |(_, b)| *c < b) {
                    best = Some((i, *c));
                }
            }
        }
        Ok(Tally { best, evaluated, feasible })
    }

    /// Total cost of `seq`, or `None` if the forecast leaves the admissible set.
    fn evaluate(&self, ctx: &Forecast, seq: &[ControlSignal]) -> Option<f64> {
        let s = &self.settings;
        let mut state = ctx.state;
        let mut cost = 0.0;

        for u in seq {
            let controlled = self.mapper.actuate(u);
            let params = ModelParams::new(controlled.alpha, ctx.beta_effective, ctx.gamma, controlled.delta);
            let adv = self.integrator.advance_span(&state, &params, s.control_dt, s.forecast_dt).ok()?;
            if adv.degeneracy.is_some() {
                return None;
            }
            state = adv.state;
            if !(state.x > s.collapse_floor) {
                return None;
            }
            cost += self.stage_cost(ctx, &state, u);
        }

        cost.is_finite().then_some(cost)
    }

    fn stage_cost(&self, ctx: &Forecast, state: &PopulationState, u: &ControlSignal) -> f64 {
        let s = &self.settings;
        let margin = s.collapse_margin * ctx.target.x;
        let barrier = if state.x < margin {
            let r = (margin - state.x) / state.x;
            s.w_barrier * r * r
        } else {
            0.0
        };

        match ctx.objective {
            Objective::Tracking => {
                let ex = (state.x - ctx.x_ref) / ctx.x_ref;
                let ey = (state.y - ctx.target.y) / ctx.target.y;
                s.w_x * ex * ex + s.w_y * ey * ey + s.w_effort * u.effort() + barrier
            }
            Objective::Recovery => (ctx.target.x / state.x).ln() + barrier,
        }
    }
}

struct Tally {
    best: Option<(usize, f64)>,
    evaluated: usize,
    feasible: usize,
}

/// Candidate outcomes in arena order: outer `None` means skipped by
/// cancellation, inner `None` means infeasible.
#[cfg(not(target_arch = "wasm32"))]
fn evaluate_arena<F>(arena: &[Vec<ControlSignal>], f: F) -> Vec<Option<Option<f64>>>
where
    F: Fn(&[ControlSignal]) -> Option<Option<f64>> + Sync + Send,
{
    use rayon::prelude::*;
    arena.par_iter().map(|seq| f(seq)).collect()
}

#[cfg(target_arch = "wasm32")]
fn evaluate_arena<F>(arena: &[Vec<ControlSignal>], f: F) -> Vec<Option<Option<f64>>>
where
    F: Fn(&[ControlSignal]) -> Option<Option<f64>>,
{
    arena.iter().map(|seq| f(seq)).collect()
}

fn grid(span: f64, levels: usize) -> Vec<f64> {
    if levels <= 1 {
        return vec![0.0];
    }
    (0..levels)
        .map(|i| -span + 2.0 * span * i as f64 / (levels - 1) as f64)
        .collect()
}

fn block_of(step: usize, horizon: usize, blocks: usize) -> usize {
    step * blocks / horizon
}

// ─── Tests ──────────────────────────────────────────────────────────────────
