// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Configuration
//
// Static configuration surface. Every calibration constant of the loop lives
// here; nothing downstream hard-codes a weight or threshold. Sections default
// independently so a partial JSON document or a handful of ECOLOGY_*
// environment variables is enough to override what matters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::actuation::ActuationMapper;
use crate::breaker::BreakerSettings;
use crate::controller::MpcSettings;
use crate::dynamics::Integrator;
use crate::equilibrium::EquilibriumError;
use crate::types::{ModelParams, PopulationState, StructuralParams};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("configuration document could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {var} has unparseable value {value:?}")]
    Env { var: &'static str, value: String },

    #[error(transparent)]
    Degenerate(#[from] EquilibriumError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

// ─── Sections ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    /// Live RK4 substep.
    pub dt: f64,
    /// Largest admissible `dt * max(alpha, gamma)`.
    pub stability_limit: f64,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self { dt: 0.01, stability_limit: 0.25 }
    }
}

impl IntegrationSettings {
    pub fn integrator(&self) -> Integrator {
        Integrator::new(self.stability_limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Wall-clock period of the control loop.
    pub cadence_ms: u64,
    /// Consecutive degenerate steps tolerated before halting.
    pub max_consecutive_degeneracies: u32,
    /// Cumulative first-integral drift that raises the invariant alarm.
    pub invariant_tolerance: f64,
    /// Capacity of the in-memory decision log.
    pub decision_log_capacity: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            cadence_ms: 1000,
            max_consecutive_degeneracies: 5,
            invariant_tolerance: 1e-3,
            decision_log_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    pub x: f64,
    pub y: f64,
}

impl Default for InitialState {
    fn default() -> Self {
        Self { x: 5.0, y: 2.0 }
    }
}

impl InitialState {
    pub fn state(&self) -> PopulationState {
        PopulationState::new(self.x, self.y)
    }
}

// ─── EngineConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub actuation: ActuationMapper,
    pub structural: StructuralParams,
    pub breaker: BreakerSettings,
    pub controller: MpcSettings,
    pub integration: IntegrationSettings,
    pub driver: DriverSettings,
    pub initial: InitialState,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `ECOLOGY_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let env = Overrides { lookup: &lookup };

        env.apply("ECOLOGY_ALPHA_MAX", &mut cfg.actuation.alpha_max)?;
        env.apply("ECOLOGY_DELTA_BASE", &mut cfg.actuation.delta_base)?;
        env.apply("ECOLOGY_DELTA_RANGE", &mut cfg.actuation.delta_range)?;

        env.apply("ECOLOGY_BETA", &mut cfg.structural.beta)?;
        env.apply("ECOLOGY_GAMMA", &mut cfg.structural.gamma)?;

        env.apply("ECOLOGY_T_ENTER", &mut cfg.breaker.t_enter)?;
        env.apply("ECOLOGY_T_EXIT", &mut cfg.breaker.t_exit)?;
        env.apply("ECOLOGY_BREAKER_K", &mut cfg.breaker.k)?;
        env.apply("ECOLOGY_BREAKER_P", &mut cfg.breaker.p)?;
        if let Some(raw) = lookup("ECOLOGY_MAX_MULTIPLIER") {
            let cap = parse("ECOLOGY_MAX_MULTIPLIER", &raw)?;
            cfg.breaker.max_multiplier = Some(cap);
        }

        env.apply("ECOLOGY_HORIZON_STEPS", &mut cfg.controller.horizon_steps)?;
        env.apply("ECOLOGY_MAX_HORIZON_STEPS", &mut cfg.controller.max_horizon_steps)?;
        env.apply("ECOLOGY_CONTROL_DT", &mut cfg.controller.control_dt)?;
        env.apply("ECOLOGY_FORECAST_DT", &mut cfg.controller.forecast_dt)?;
        env.apply("ECOLOGY_SOLVE_TIMEOUT_MS", &mut cfg.controller.solve_timeout_ms)?;

        env.apply("ECOLOGY_DT", &mut cfg.integration.dt)?;
        env.apply("ECOLOGY_STABILITY_LIMIT", &mut cfg.integration.stability_limit)?;

        env.apply("ECOLOGY_CADENCE_MS", &mut cfg.driver.cadence_ms)?;
        env.apply("ECOLOGY_MAX_DEGENERACIES", &mut cfg.driver.max_consecutive_degeneracies)?;

        env.apply("ECOLOGY_INITIAL_X", &mut cfg.initial.x)?;
        env.apply("ECOLOGY_INITIAL_Y", &mut cfg.initial.y)?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every section. Degenerate coefficients are rejected here so the
    /// running loop never meets a zero denominator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.actuation;
        positive("actuation.alpha_max", a.alpha_max)?;
        positive("actuation.delta_base", a.delta_base)?;
        non_negative("actuation.delta_range", a.delta_range)?;
        if a.delta_range >= a.delta_base {
            return Err(EquilibriumError::DegenerateParameters {
                reason: "conversion band reaches zero (delta_range >= delta_base)",
            }
            .into());
        }

        validate_structural(&self.structural)?;

        validate_breaker(&self.breaker)?;

        let c = &self.controller;
        positive("controller.control_dt", c.control_dt)?;
        positive("controller.forecast_dt", c.forecast_dt)?;
        if c.forecast_dt > c.control_dt {
            return Err(invalid("controller.forecast_dt", "forecast substep exceeds the control interval"));
        }
        if c.max_horizon_steps == 0 {
            return Err(invalid("controller.max_horizon_steps", "must be at least 1"));
        }
        if c.grid_levels == 0 {
            return Err(invalid("controller.grid_levels", "must be at least 1"));
        }
        if c.move_blocks == 0 {
            return Err(invalid("controller.move_blocks", "must be at least 1"));
        }
        non_negative("controller.signal_span", c.signal_span)?;
        for (field, w) in [
            ("controller.w_x", c.w_x),
            ("controller.w_y", c.w_y),
            ("controller.w_effort", c.w_effort),
            ("controller.w_barrier", c.w_barrier),
            ("controller.collapse_margin", c.collapse_margin),
            ("controller.collapse_floor", c.collapse_floor),
            ("controller.price_gain", c.price_gain),
        ] {
            non_negative(field, w)?;
        }
        if c.price_gain >= 1.0 {
            return Err(invalid("controller.price_gain", "target shift must stay below 100%"));
        }
        if c.solve_timeout_ms == 0 {
            return Err(invalid("controller.solve_timeout_ms", "must be positive"));
        }

        let i = &self.integration;
        positive("integration.dt", i.dt)?;
        positive("integration.stability_limit", i.stability_limit)?;
        let integrator = i.integrator();
        let fastest = ModelParams::new(a.alpha_max, self.structural.beta, self.structural.gamma, a.delta_base);
        integrator
            .check_step(i.dt, &fastest)
            .map_err(|e| invalid("integration.dt", e.to_string()))?;
        integrator
            .check_step(c.forecast_dt, &fastest)
            .map_err(|e| invalid("controller.forecast_dt", e.to_string()))?;

        let d = &self.driver;
        if d.cadence_ms == 0 {
            return Err(invalid("driver.cadence_ms", "must be positive"));
        }
        if d.max_consecutive_degeneracies == 0 {
            return Err(invalid("driver.max_consecutive_degeneracies", "must be at least 1"));
        }
        positive("driver.invariant_tolerance", d.invariant_tolerance)?;

        if !self.initial.state().is_admissible() {
            return Err(invalid(
                "initial",
                format!("populations must be finite and nonnegative, got ({}, {})", self.initial.x, self.initial.y),
            ));
        }
        Ok(())
    }
}

/// Governance-time check of structural coefficients.
pub fn validate_structural(s: &StructuralParams) -> Result<(), ConfigError> {
    if !(s.beta > 0.0) || !s.beta.is_finite() {
        return Err(EquilibriumError::DegenerateParameters { reason: "structural beta must be positive" }.into());
    }
    positive("structural.gamma", s.gamma)
}

/// Governance-time check of breaker thresholds and curve.
pub fn validate_breaker(b: &BreakerSettings) -> Result<(), ConfigError> {
    positive("breaker.t_enter", b.t_enter)?;
    non_negative("breaker.t_exit", b.t_exit)?;
    if b.t_exit >= b.t_enter {
        return Err(invalid("breaker.t_exit", "exit threshold must be strictly below entry threshold"));
    }
    positive("breaker.k", b.k)?;
    if !(b.p > 1.0) || !b.p.is_finite() {
        return Err(invalid("breaker.p", format!("exponent must exceed 1, got {}", b.p)));
    }
    if let Some(cap) = b.max_multiplier {
        if !(cap > 1.0) || !cap.is_finite() {
            return Err(invalid("breaker.max_multiplier", format!("cap must exceed 1, got {cap}")));
        }
    }
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

struct Overrides<'a, F> {
    lookup: &'a F,
}

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn apply<T: FromStr>(&self, var: &'static str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = (self.lookup)(var) {
            *slot = parse(var, &raw)?;
        }
        Ok(())
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Env { var, value: raw.to_string() })
}

fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and positive, got {v}")))
    }
}

fn non_negative(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and nonnegative, got {v}")))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().expect("test: defaults are valid");
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{ "breaker": { "t_enter": 0.2 }, "structural": { "gamma": 0.04 } }"#)
            .expect("test: valid partial document");
        assert_eq!(cfg.breaker.t_enter, 0.2);
        assert_eq!(cfg.breaker.t_exit, 0.05);
        assert_eq!(cfg.structural.gamma, 0.04);
        assert_eq!(cfg.structural.beta, 0.02);
        assert_eq!(cfg.controller, MpcSettings::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(EngineConfig::from_json_str("{ not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_beta_is_degenerate() {
        let mut cfg = EngineConfig::default();
        cfg.structural.beta = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Degenerate(EquilibriumError::DegenerateParameters { .. }))));
    }

    #[test]
    fn conversion_band_touching_zero_is_degenerate() {
        let mut cfg = EngineConfig::default();
        cfg.actuation.delta_range = cfg.actuation.delta_base;
        assert!(matches!(cfg.validate(), Err(ConfigError::Degenerate(_))));
    }

    #[test]
    fn hysteresis_requires_exit_below_enter() {
        let mut cfg = EngineConfig::default();
        cfg.breaker.t_exit = cfg.breaker.t_enter;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "breaker.t_exit", .. })));
    }

    #[test]
    fn linear_breaker_curve_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.breaker.p = 1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "breaker.p", .. })));
    }

    #[test]
    fn flat_breaker_gain_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.breaker.k = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "breaker.k", .. })));
    }

    #[test]
    fn unit_multiplier_cap_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.breaker.max_multiplier = Some(1.0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "breaker.max_multiplier", .. })));

        cfg.breaker.max_multiplier = Some(1.5);
        cfg.validate().expect("test: cap above one is valid");
    }

    #[test]
    fn unstable_integration_step_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.integration.dt = 2.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "integration.dt", .. })));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ECOLOGY_ALPHA_MAX", "0.3"),
            ("ECOLOGY_T_ENTER", " 0.15 "),
            ("ECOLOGY_CADENCE_MS", "250"),
            ("ECOLOGY_MAX_MULTIPLIER", "6"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).expect("test: valid overrides");
        assert_eq!(cfg.actuation.alpha_max, 0.3);
        assert_eq!(cfg.breaker.t_enter, 0.15);
        assert_eq!(cfg.driver.cadence_ms, 250);
        assert_eq!(cfg.breaker.max_multiplier, Some(6.0));
        assert_eq!(cfg.structural, StructuralParams::default());
    }

    #[test]
    fn unparseable_variable_names_the_culprit() {
        let err = EngineConfig::from_lookup(|k| (k == "ECOLOGY_GAMMA").then(|| "fast".to_string()))
            .expect_err("test: bad value");
        assert!(matches!(err, ConfigError::Env { var: "ECOLOGY_GAMMA", .. }));
    }
}
