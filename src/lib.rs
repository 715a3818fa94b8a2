// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine

pub mod types;
pub mod dynamics;
pub mod equilibrium;
pub mod invariant;
pub mod actuation;
pub mod controller;
pub mod breaker;
pub mod config;
pub mod driver;
pub mod simulation;
pub mod adapter;

#[cfg(not(target_arch = "wasm32"))]
pub mod runtime;

pub use types::*;
pub use actuation::ActuationMapper;
pub use breaker::{BreakerSettings, CircuitBreaker, Transition};
pub use config::{ConfigError, EngineConfig};
pub use controller::{Cancellation, MpcSettings, Objective, Plan, PredictiveController, SolveError, SolveRequest};
pub use driver::{DecisionLog, DecisionSink, DriverError, FeedbackLoop, NullSink, ObservationError, StepReport};
pub use dynamics::{Degeneracy, DynamicsError, Integrator};
pub use simulation::EcologySimulation;

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl EcologySimulation {
    /// Build from an optional JSON configuration document.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<EcologySimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config = match config_json {
            Some(raw) => EngineConfig::from_json_str(&raw),
            None => Ok(EngineConfig::default()),
        };
        config
            .and_then(EcologySimulation::from_config)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Returns `false` when the value was rejected as non-finite.
    pub fn observe(&mut self, price_differential: f64) -> bool {
        self.observe_core(price_differential).is_ok()
    }

    pub fn step(&mut self) -> JsValue {
        match self.step_core() {
            Ok(report) => serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL),
            Err(e) => {
                log(&format!("ecology engine halted: {e}"));
                JsValue::NULL
            }
        }
    }

    /// Run N steps without returning reports (fast batch mode for benchmarking)
    pub fn run_batch(&mut self, steps: u32) -> u32 {
        self.run_batch_core(steps)
    }

    pub fn diagnostics(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.control.diagnostics()).unwrap_or(JsValue::NULL)
    }

    pub fn decisions(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.control.sink().to_vec()).unwrap_or(JsValue::NULL)
    }

    /// Decimal directives, serialized with rates as strings.
    pub fn directives(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.directives_core()).unwrap_or(JsValue::NULL)
    }

    pub fn set_structural(&mut self, beta: f64, gamma: f64) -> Result<(), JsValue> {
        self.control
            .set_structural(StructuralParams { beta, gamma })
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn is_halted(&self) -> bool {
        self.control.is_halted()
    }

    /// Reset simulation to initial state
    pub fn reset(&mut self) -> Result<(), JsValue> {
        *self = EcologySimulation::from_config(self.config.clone()).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(())
    }
}
