// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Simulation Core
//
// Single-threaded host wrapper around the feedback loop. The browser has no
// wall clock cadence of its own here: the host calls `step` and the wrapper
// stamps observations on a simulated millisecond clock advanced by one
// cadence per step.

use wasm_bindgen::prelude::*;

use crate::adapter::LedgerDirective;
use crate::config::{ConfigError, EngineConfig};
use crate::driver::{DecisionLog, DriverError, FeedbackLoop, ObservationError, StepReport};

// ─── EcologySimulation struct ────────────────────────────────────────────────

#[wasm_bindgen]
pub struct EcologySimulation {
    pub(crate) control: FeedbackLoop<DecisionLog>,
    pub(crate) config: EngineConfig,
    pub(crate) clock_ms: u64,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl EcologySimulation {
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        let log = DecisionLog::new(config.driver.decision_log_capacity);
        let control = FeedbackLoop::new(config.clone(), log)?;
        Ok(Self { control, config, clock_ms: 0 })
    }

    /// Observe `price_differential` at the current simulated time.
    pub fn observe_core(&mut self, price_differential: f64) -> Result<(), ObservationError> {
        self.control.observe_price_differential(price_differential, self.clock_ms)
    }

    pub fn step_core(&mut self) -> Result<StepReport, DriverError> {
        let report = self.control.step();
        self.clock_ms += self.config.driver.cadence_ms;
        report
    }

    /// Steps until `steps` are done or the loop halts; returns steps completed.
    pub fn run_batch_core(&mut self, steps: u32) -> u32 {
        let mut done = 0;
        for _ in 0..steps {
            if self.step_core().is_err() {
                break;
            }
            done += 1;
        }
        done
    }

    pub fn directives_core(&self) -> Vec<LedgerDirective> {
        self.control.sink().entries().map(LedgerDirective::from_decision).collect()
    }

    pub fn control(&self) -> &FeedbackLoop<DecisionLog> {
        &self.control
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BreakerMode;

    fn sim() -> EcologySimulation {
        let mut cfg = EngineConfig::default();
        cfg.controller.horizon_steps = 5;
        cfg.driver.decision_log_capacity = 8;
        EcologySimulation::from_config(cfg).expect("test: config")
    }

    #[test]
    fn clock_advances_one_cadence_per_step() {
        let mut s = sim();
        s.observe_core(0.0).expect("test: finite");
        s.step_core().expect("test: step");
        s.step_core().expect("test: step");
        assert_eq!(s.clock_ms(), 2000);
        assert_eq!(s.control().diagnostics().step, 2);
    }

    #[test]
    fn batch_fills_bounded_log_and_directives() {
        let mut s = sim();
        assert_eq!(s.run_batch_core(12), 12);
        assert_eq!(s.control().sink().len(), 8);
        let directives = s.directives_core();
        assert_eq!(directives.len(), 8);
        assert_eq!(directives.last().map(|d| d.step), Some(12));
    }

    #[test]
    fn flash_crash_trips_breaker() {
        let mut s = sim();
        s.observe_core(0.5).expect("test: finite");
        s.step_core().expect("test: step");
        assert_eq!(s.control().breaker().mode(), BreakerMode::Emergency);
        assert!(s.directives_core()[0].emergency);
    }
}
