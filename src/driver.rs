// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Feedback Loop Driver
//
// Owns the single live record: populations, controlled coefficients, breaker
// state, invariant monitor and the pending observation. One control step is
// read snapshot -> solve -> commit. The solve phase works on an owned
// request and never touches the record, so it can run on another thread
// while the driver waits (see `runtime`).
//
// Every step emits exactly one decision. Recoverable conditions (infeasible
// or timed-out solves, non-finite observations, clamped integration) hold
// the previous signal and are reported as anomalies. Only repeated numeric
// degeneracy halts the loop.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{CircuitBreaker, Transition};
use crate::config::{self, ConfigError, DriverSettings, EngineConfig, IntegrationSettings};
use crate::controller::{Cancellation, Plan, PredictiveController, SolveError, SolveRequest};
use crate::dynamics::{Degeneracy, Integrator};
use crate::equilibrium;
use crate::invariant::OrbitInvariant;
use crate::types::*;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObservationError {
    #[error("price differential must be finite, got {value}")]
    InvalidObservation { value: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("system halted after {consecutive} consecutive numeric degeneracies")]
    SystemHalt { consecutive: u32 },
}

// ─── Decision Sinks ─────────────────────────────────────────────────────────

/// Outbound collaborator receiving one decision per control step.
pub trait DecisionSink {
    fn on_control_decision(&mut self, decision: &ControlDecision);
}

impl<F> DecisionSink for F
where
    F: FnMut(&ControlDecision),
{
    fn on_control_decision(&mut self, decision: &ControlDecision) {
        self(decision)
    }
}

/// Discards decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DecisionSink for NullSink {
    fn on_control_decision(&mut self, _decision: &ControlDecision) {}
}

/// Bounded in-memory decision history; oldest entries are evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    capacity: usize,
    entries: VecDeque<ControlDecision>,
    emitted: u64,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.clamp(1, 1024)),
            emitted: 0,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ControlDecision> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ControlDecision> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total decisions received, including evicted ones.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn to_vec(&self) -> Vec<ControlDecision> {
        self.entries.iter().copied().collect()
    }
}

impl DecisionSink for DecisionLog {
    fn on_control_decision(&mut self, decision: &ControlDecision) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(*decision);
        self.emitted += 1;
    }
}

// ─── Step Records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum PendingObservation {
    Valid(Observation),
    Invalid { value: f64, at_ms: u64 },
}

impl PendingObservation {
    fn at_ms(&self) -> u64 {
        match self {
            Self::Valid(o) => o.at_ms,
            Self::Invalid { at_ms, .. } => *at_ms,
        }
    }
}

/// Snapshot taken by [`FeedbackLoop::begin_step`].
#[derive(Debug, Clone)]
pub struct PreparedStep {
    step: u64,
    request: Option<SolveRequest>,
    hold: Option<DecisionSource>,
    anomalies: Vec<Anomaly>,
    transition: Option<Transition>,
}

impl PreparedStep {
    /// Solve input, absent when the step holds without consulting the
    /// controller.
    pub fn request(&self) -> Option<&SolveRequest> {
        self.request.as_ref()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn transition(&self) -> Option<Transition> {
        self.transition
    }
}

/// Outcome of one committed control step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub decision: ControlDecision,
    pub anomalies: Vec<Anomaly>,
    pub cost: Option<f64>,
    pub transition: Option<Transition>,
}

// ─── FeedbackLoop ───────────────────────────────────────────────────────────

pub struct FeedbackLoop<S: DecisionSink = NullSink> {
    controller: Arc<PredictiveController>,
    integrator: Integrator,
    integration: IntegrationSettings,
    settings: DriverSettings,

    state: PopulationState,
    structural: StructuralParams,
    controlled: ControlledParams,
    breaker: CircuitBreaker,
    invariant: OrbitInvariant,

    last_signal: ControlSignal,
    last_plan: Vec<ControlSignal>,
    last_cost: Option<f64>,
    last_anomalies: Vec<Anomaly>,

    pending: Option<PendingObservation>,
    last_observed_at: Option<u64>,
    last_price_differential: f64,

    step: u64,
    version: u64,
    consecutive_degeneracies: u32,
    halted: bool,

    sink: S,
}

impl<S: DecisionSink> FeedbackLoop<S> {
    /// Validate `config` and start in `Normal` at the configured initial state
    /// with the neutral control signal applied.
    pub fn new(config: EngineConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let controller = PredictiveController::new(
            config.actuation,
            config.integration.integrator(),
            config.controller,
        );
        let last_signal = ControlSignal::default();
        let controlled = config.actuation.actuate(&last_signal);

        tracing::info!(
            x = config.initial.x,
            y = config.initial.y,
            alpha = controlled.alpha,
            delta = controlled.delta,
            "feedback loop initialized"
        );

        Ok(Self {
            controller: Arc::new(controller),
            integrator: config.integration.integrator(),
            integration: config.integration,
            settings: config.driver,
            state: config.initial.state(),
            structural: config.structural,
            controlled,
            breaker: CircuitBreaker::new(config.breaker),
            invariant: OrbitInvariant::new(config.driver.invariant_tolerance),
            last_signal,
            last_plan: Vec::new(),
            last_cost: None,
            last_anomalies: Vec::new(),
            pending: None,
            last_observed_at: None,
            last_price_differential: 0.0,
            step: 0,
            version: 0,
            consecutive_degeneracies: 0,
            halted: false,
            sink,
        })
    }

    // ─── Inbound ────────────────────────────────────────────────────────

    /// Offer a price differential observed at `at_ms`.
    ///
    /// Observations coalesce: only the newest by timestamp is kept until the
    /// next step. A non-finite value is still recorded, so the next step
    /// skips its solve and holds, unless a newer finite value replaces it.
    pub fn observe_price_differential(&mut self, price_differential: f64, at_ms: u64) -> Result<(), ObservationError> {
        let newest = self.pending.map(|p| p.at_ms()).or(self.last_observed_at);
        if newest.is_some_and(|t| at_ms < t) {
            tracing::debug!(at_ms, newest = ?newest, "stale observation dropped");
            return Ok(());
        }

        if !price_differential.is_finite() {
            self.pending = Some(PendingObservation::Invalid { value: price_differential, at_ms });
            return Err(ObservationError::InvalidObservation { value: price_differential });
        }

        self.pending = Some(PendingObservation::Valid(Observation { price_differential, at_ms }));
        Ok(())
    }

    // ─── Control Step ───────────────────────────────────────────────────

    /// Run one step with the configured solve budget.
    pub fn step(&mut self) -> Result<StepReport, DriverError> {
        let budget = Duration::from_millis(self.controller.settings().solve_timeout_ms);
        self.step_with(&Cancellation::with_timeout(budget))
    }

    /// Run one step, solving inline under `cancel`.
    pub fn step_with(&mut self, cancel: &Cancellation) -> Result<StepReport, DriverError> {
        let prepared = self.begin_step()?;
        let outcome = prepared.request().map(|req| self.controller.solve(req, cancel));
        self.commit_step(prepared, outcome)
    }

    /// Consume the pending observation, update the breaker and snapshot a
    /// solve request.
    pub fn begin_step(&mut self) -> Result<PreparedStep, DriverError> {
        if self.halted {
            return Err(DriverError::SystemHalt { consecutive: self.consecutive_degeneracies });
        }
        let step = self.step + 1;
        let mut anomalies = Vec::new();

        match self.pending.take() {
            Some(PendingObservation::Invalid { value, at_ms }) => {
                self.last_observed_at = Some(at_ms);
                tracing::warn!(step, value, "non-finite observation, holding previous signal");
                anomalies.push(Anomaly::InvalidObservation { value });
                return Ok(PreparedStep {
                    step,
                    request: None,
                    hold: Some(DecisionSource::HeldInvalidObservation),
                    anomalies,
                    transition: None,
                });
            }
            Some(PendingObservation::Valid(o)) => {
                self.last_observed_at = Some(o.at_ms);
                self.last_price_differential = o.price_differential;
            }
            None => {}
        }

        let transition = self.breaker.evaluate(self.last_price_differential, step);
        let request = SolveRequest {
            state: self.state,
            structural: self.structural,
            beta_multiplier: self.breaker.beta_multiplier(),
            price_differential: self.last_price_differential,
            observation_scale: self.breaker.settings().t_enter,
            horizon_steps: self.controller.resolve_horizon(&self.structural),
            objective: self.breaker.objective(),
            warm_start: self.last_plan.clone(),
            hold: self.last_signal,
        };

        Ok(PreparedStep { step, request: Some(request), hold: None, anomalies, transition })
    }

    /// Apply the solve outcome, advance the live state over one control
    /// interval and emit the decision.
    pub fn commit_step(
        &mut self,
        prepared: PreparedStep,
        outcome: Option<Result<Plan, SolveError>>,
    ) -> Result<StepReport, DriverError> {
        let PreparedStep { step, hold, mut anomalies, transition, .. } = prepared;

        let (signal, source, cost) = match (hold, outcome) {
            (Some(source), _) => (self.last_signal, source, None),
            (None, Some(Ok(plan))) => {
                let first = plan.first();
                let cost = plan.cost;
                self.last_plan = plan.signals;
                (first, DecisionSource::Optimized, Some(cost))
            }
            (None, Some(Err(e))) => {
                let (source, anomaly) = match e {
                    SolveError::Infeasible { .. } => (DecisionSource::HeldInfeasible, Anomaly::Infeasible),
                    SolveError::Timeout { .. } => (DecisionSource::HeldTimeout, Anomaly::Timeout),
                    SolveError::Dynamics(_) | SolveError::Equilibrium(_) => {
                        (DecisionSource::HeldForecastFailure, Anomaly::ForecastFailure)
                    }
                };
                tracing::warn!(step, error = %e, "controller solve failed, holding previous signal");
                anomalies.push(anomaly);
                (self.last_signal, source, None)
            }
            (None, None) => {
                anomalies.push(Anomaly::ForecastFailure);
                (self.last_signal, DecisionSource::HeldForecastFailure, None)
            }
        };

        let controlled = self.controller.mapper().actuate(&signal);
        let params = ModelParams::compose(self.structural, controlled)
            .with_beta_multiplier(self.breaker.beta_multiplier());

        let before = self.state;
        let span = self.controller.settings().control_dt;
        let degeneracy = match self.integrator.advance_span(&before, &params, span, self.integration.dt) {
            Ok(adv) => {
                self.state = adv.state;
                adv.degeneracy
            }
            Err(e) => {
                tracing::warn!(step, error = %e, "live advance rejected, state held");
                self.state.t += span;
                Some(Degeneracy::NonFinite)
            }
        };

        match degeneracy {
            Some(d) => {
                self.consecutive_degeneracies += 1;
                anomalies.push(Anomaly::NumericDegeneracy);
                tracing::warn!(
                    step,
                    degeneracy = ?d,
                    consecutive = self.consecutive_degeneracies,
                    x = self.state.x,
                    y = self.state.y,
                    "numeric degeneracy clamped"
                );
            }
            None => {
                self.consecutive_degeneracies = 0;
                self.invariant.record(&before, &self.state, &params);
            }
        }

        self.controlled = controlled;
        self.last_signal = signal;
        if cost.is_some() {
            self.last_cost = cost;
        }
        self.step = step;
        self.version += 1;

        let decision = ControlDecision {
            step,
            t: self.state.t,
            alpha: controlled.alpha,
            delta: controlled.delta,
            beta_effective: params.beta,
            breaker: self.breaker.mode(),
            source,
            signal,
        };
        self.sink.on_control_decision(&decision);
        self.last_anomalies = anomalies.clone();

        tracing::debug!(
            step,
            x = self.state.x,
            y = self.state.y,
            delta_p = self.last_price_differential,
            cost = ?cost,
            mode = self.breaker.mode().label(),
            source = ?source,
            "control decision"
        );

        if self.consecutive_degeneracies >= self.settings.max_consecutive_degeneracies {
            self.halted = true;
            tracing::error!(step, consecutive = self.consecutive_degeneracies, "system halt: repeated numeric degeneracy");
            return Err(DriverError::SystemHalt { consecutive: self.consecutive_degeneracies });
        }

        Ok(StepReport { decision, anomalies, cost, transition })
    }

    // ─── Governance ─────────────────────────────────────────────────────

    /// Replace structural coefficients. Never called by the controller.
    pub fn set_structural(&mut self, structural: StructuralParams) -> Result<(), ConfigError> {
        config::validate_structural(&structural)?;
        let mapper = self.controller.mapper();
        let fastest = ModelParams::new(mapper.alpha_max, structural.beta, structural.gamma, mapper.delta_base);
        for (field, dt) in [
            ("integration.dt", self.integration.dt),
            ("controller.forecast_dt", self.controller.settings().forecast_dt),
        ] {
            self.integrator
                .check_step(dt, &fastest)
                .map_err(|e| ConfigError::Invalid { field, reason: e.to_string() })?;
        }

        tracing::info!(beta = structural.beta, gamma = structural.gamma, "structural parameters replaced");
        self.structural = structural;
        self.invariant.reset();
        self.version += 1;
        Ok(())
    }

    /// Replace breaker thresholds and curve; the current mode is kept.
    pub fn set_breaker(&mut self, settings: crate::breaker::BreakerSettings) -> Result<(), ConfigError> {
        config::validate_breaker(&settings)?;
        tracing::info!(t_enter = settings.t_enter, t_exit = settings.t_exit, "breaker settings replaced");
        self.breaker.set_settings(settings);
        self.version += 1;
        Ok(())
    }

    // ─── Read Interface ─────────────────────────────────────────────────

    /// Parameters currently applied to the live integration.
    pub fn live_params(&self) -> ModelParams {
        ModelParams::compose(self.structural, self.controlled).with_beta_multiplier(self.breaker.beta_multiplier())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let params = self.live_params();
        let eq = equilibrium::equilibrium(&params).ok().map(|e| (e.x, e.y));
        Diagnostics {
            step: self.step,
            version: self.version,
            x: self.state.x,
            y: self.state.y,
            t: self.state.t,
            equilibrium: eq,
            stability: equilibrium::classify(&params),
            period: equilibrium::period(&params),
            breaker: self.breaker.mode(),
            beta_multiplier: self.breaker.beta_multiplier(),
            breaker_trips: self.breaker.trips(),
            alpha: params.alpha,
            delta: params.delta,
            beta_effective: params.beta,
            last_cost: self.last_cost,
            last_price_differential: self.last_price_differential,
            consecutive_degeneracies: self.consecutive_degeneracies,
            invariant_drift: self.invariant.cumulative_drift(),
            invariant_max_step_drift: self.invariant.max_step_drift(),
            invariant_alarm: self.invariant.is_alarmed(),
            last_anomalies: self.last_anomalies.clone(),
        }
    }

    pub fn state(&self) -> PopulationState {
        self.state
    }

    pub fn structural(&self) -> StructuralParams {
        self.structural
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn last_signal(&self) -> ControlSignal {
        self.last_signal
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Shared handle for off-thread solves.
    pub fn controller(&self) -> Arc<PredictiveController> {
        Arc::clone(&self.controller)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerSettings;

    fn quick_config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.controller.horizon_steps = 6;
        cfg
    }

    fn logged(cfg: EngineConfig) -> FeedbackLoop<DecisionLog> {
        FeedbackLoop::new(cfg, DecisionLog::new(64)).expect("test: valid config")
    }

    #[test]
    fn rejects_degenerate_config_at_startup() {
        let mut cfg = quick_config();
        cfg.structural.beta = 0.0;
        assert!(matches!(
            FeedbackLoop::new(cfg, NullSink),
            Err(ConfigError::Degenerate(_))
        ));
    }

    #[test]
    fn every_step_emits_one_decision() {
        let mut lp = logged(quick_config());
        for i in 0..5 {
            lp.observe_price_differential(0.01, i).expect("test: finite");
            lp.step().expect("test: step");
        }
        assert_eq!(lp.sink().emitted(), 5);
        let last = lp.sink().last().expect("test: decision");
        assert_eq!(last.step, 5);
        assert!((last.t - 5.0).abs() < 1e-9);
    }

    #[test]
    fn latest_observation_wins_and_stale_is_dropped() {
        let mut lp = logged(quick_config());
        lp.observe_price_differential(0.02, 10).expect("test: finite");
        lp.observe_price_differential(0.04, 20).expect("test: finite");
        lp.observe_price_differential(0.09, 15).expect("test: stale but finite");
        lp.step().expect("test: step");
        assert_eq!(lp.diagnostics().last_price_differential, 0.04);

        lp.observe_price_differential(0.07, 5).expect("test: older than consumed");
        lp.step().expect("test: step");
        assert_eq!(lp.diagnostics().last_price_differential, 0.04);
    }

    #[test]
    fn invalid_observation_holds_previous_signal() {
        let mut lp = logged(quick_config());
        lp.observe_price_differential(0.03, 1).expect("test: finite");
        lp.step().expect("test: step");
        let applied = lp.last_signal();

        let err = lp.observe_price_differential(f64::NAN, 2).expect_err("test: NaN rejected");
        assert!(matches!(err, ObservationError::InvalidObservation { .. }));
        let report = lp.step().expect("test: step still produced");
        assert_eq!(report.decision.source, DecisionSource::HeldInvalidObservation);
        assert_eq!(report.decision.signal, applied);
        assert!(matches!(report.anomalies.as_slice(), [Anomaly::InvalidObservation { .. }]));
    }

    #[test]
    fn newer_finite_value_replaces_invalid_pending() {
        let mut lp = logged(quick_config());
        let _ = lp.observe_price_differential(f64::INFINITY, 1);
        lp.observe_price_differential(0.01, 2).expect("test: finite");
        let report = lp.step().expect("test: step");
        assert_eq!(report.decision.source, DecisionSource::Optimized);
    }

    #[test]
    fn cancelled_solve_holds_signal() {
        let mut lp = logged(quick_config());
        lp.step().expect("test: step");
        let applied = lp.last_signal();
        let cancel = Cancellation::never();
        cancel.cancel();
        let report = lp.step_with(&cancel).expect("test: held step");
        assert_eq!(report.decision.source, DecisionSource::HeldTimeout);
        assert_eq!(report.decision.signal, applied);
        assert_eq!(report.anomalies, vec![Anomaly::Timeout]);
    }

    #[test]
    fn emergency_trips_within_one_step() {
        let mut cfg = quick_config();
        cfg.initial.x = 0.5;
        cfg.initial.y = 1.0;
        cfg.controller.horizon_steps = 5;
        let t_enter = cfg.breaker.t_enter;
        let mut lp = logged(cfg);

        lp.observe_price_differential(2.0 * t_enter, 1).expect("test: finite");
        let report = lp.step().expect("test: step");
        assert!(matches!(report.transition, Some(Transition::Tripped { .. })));
        assert_eq!(report.decision.breaker, BreakerMode::Emergency);
        assert!(report.decision.beta_effective > lp.structural().beta);
        assert!(
            report.decision.alpha > 0.9 * 0.2,
            "recovery should push alpha toward alpha_max, got {}",
            report.decision.alpha
        );
    }

    #[test]
    fn collapsed_economy_holds_and_stays_absorbing() {
        let mut cfg = quick_config();
        cfg.initial.x = 0.0;
        cfg.initial.y = 3.0;
        let mut lp = logged(cfg);
        let report = lp.step().expect("test: held step");
        assert_eq!(report.decision.source, DecisionSource::HeldInfeasible);
        assert_eq!(lp.state().x, 0.0);
    }

    #[test]
    fn repeated_degeneracy_halts() {
        let mut cfg = quick_config();
        cfg.driver.max_consecutive_degeneracies = 2;
        // Interaction term overflows; every advance holds the sample.
        cfg.initial.x = 1e200;
        cfg.initial.y = 1e200;
        let mut lp = logged(cfg);

        let first = lp.step().expect("test: first degeneracy recovered");
        assert!(first.anomalies.contains(&Anomaly::NumericDegeneracy));
        assert!(lp.state().is_admissible());
        let err = lp.step().expect_err("test: second consecutive halts");
        assert!(matches!(err, DriverError::SystemHalt { consecutive: 2 }));
        assert!(lp.is_halted());
        assert!(matches!(lp.step(), Err(DriverError::SystemHalt { .. })));
    }

    #[test]
    fn governance_updates_are_validated() {
        let mut lp = logged(quick_config());
        let before = lp.diagnostics().version;
        assert!(lp.set_structural(StructuralParams { beta: 0.0, gamma: 0.05 }).is_err());
        lp.set_structural(StructuralParams { beta: 0.03, gamma: 0.05 }).expect("test: valid");
        assert_eq!(lp.structural().beta, 0.03);
        assert!(lp
            .set_breaker(BreakerSettings { t_exit: 0.2, ..BreakerSettings::default() })
            .is_err());
        assert_eq!(lp.diagnostics().version, before + 1);
    }

    #[test]
    fn diagnostics_report_live_equilibrium() {
        let lp = logged(quick_config());
        let d = lp.diagnostics();
        // alpha = 0.1, delta = 0.01 at the neutral signal.
        let (xe, ye) = d.equilibrium.expect("test: defined");
        assert!((xe - 5.0).abs() < 1e-9);
        assert!((ye - 5.0).abs() < 1e-9);
        assert_eq!(d.stability, StabilityClass::Center);
        assert_eq!(d.breaker, BreakerMode::Normal);
        assert!(d.last_cost.is_none());
    }

    #[test]
    fn diagnostics_carry_invariant_drift_statistics() {
        let mut lp = logged(quick_config());
        assert_eq!(lp.diagnostics().invariant_max_step_drift, 0.0);
        for i in 0..4 {
            lp.observe_price_differential(0.0, i).expect("test: finite");
            lp.step().expect("test: step");
        }
        let d = lp.diagnostics();
        assert!(d.invariant_max_step_drift > 0.0);
        assert!(d.invariant_max_step_drift <= d.invariant_drift);

        lp.set_structural(StructuralParams { beta: 0.03, gamma: 0.05 }).expect("test: valid");
        let d = lp.diagnostics();
        assert_eq!(d.invariant_max_step_drift, 0.0);
        assert_eq!(d.invariant_drift, 0.0);
    }

    #[test]
    fn emergency_multiplier_lifts_beta_above_structural() {
        let mut cfg = quick_config();
        cfg.breaker.max_multiplier = Some(1.5);
        let t_enter = cfg.breaker.t_enter;
        let mut lp = logged(cfg);

        lp.observe_price_differential(1.5 * t_enter, 1).expect("test: finite");
        lp.step().expect("test: step");
        let d = lp.diagnostics();
        assert_eq!(d.breaker, BreakerMode::Emergency);
        assert!(d.beta_multiplier > 1.0 && d.beta_multiplier <= 1.5);
        assert!(d.beta_effective > lp.structural().beta);
    }

    #[test]
    fn closure_sink_receives_decisions() {
        let mut seen = Vec::new();
        {
            let mut lp = FeedbackLoop::new(quick_config(), |d: &ControlDecision| seen.push(d.step))
                .expect("test: valid config");
            lp.step().expect("test: step");
            lp.step().expect("test: step");
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn decision_log_evicts_oldest() {
        let mut log = DecisionLog::new(2);
        let mut lp = logged(quick_config());
        for _ in 0..3 {
            let report = lp.step().expect("test: step");
            log.on_control_decision(&report.decision);
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.emitted(), 3);
        assert_eq!(log.entries().next().map(|d| d.step), Some(2));
    }
}
