// Scenario Definitions - oracle price-differential paths for the control loop
// All scenario logic lives in curve functions and config/event hooks; the engine is untouched

use ecology_engine::{DecisionLog, EngineConfig, FeedbackLoop, StructuralParams};

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub steps: u64,
    /// Clean oracle reading at each step, before noise.
    pub price_curve: fn(u64) -> f64,
    /// Standard deviation of Gaussian oracle noise.
    pub noise_sigma: f64,
    /// Probability that a reading arrives as NaN.
    pub dropout_prob: f64,
    pub criteria: PassCriteria,
    /// Config tweaks applied before the loop is built.
    pub configure: Option<fn(&mut EngineConfig)>,
    /// Governance action injected at a given step.
    pub mid_event: Option<fn(&mut FeedbackLoop<DecisionLog>, u64)>,
}

pub struct PassCriteria {
    /// Resource must stay strictly above this level.
    pub min_resource: f64,
    /// Populations must stay below this level.
    pub max_population: f64,
    /// Upper bound on Normal/Emergency transitions.
    pub max_breaker_transitions: Option<u64>,
    pub require_emergency: bool,
    pub require_no_halt: bool,
    /// Breaker must be back in Normal at the end.
    pub require_recovered: bool,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            min_resource: 1e-3,
            max_population: 1e3,
            max_breaker_transitions: None,
            require_emergency: false,
            require_no_halt: true,
            require_recovered: false,
        }
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

fn calm(_step: u64) -> f64 {
    0.0
}

fn oscillating_arbitrage(step: u64) -> f64 {
    0.04 * (step as f64 / 8.0).sin()
}

fn flash_crash(step: u64) -> f64 {
    match step {
        50..=54 => -0.35,
        _ => 0.0,
    }
}

fn sustained_depeg(step: u64) -> f64 {
    if step < 20 {
        0.0
    } else {
        (0.01 * (step - 20) as f64).min(0.15)
    }
}

fn whipsaw(step: u64) -> f64 {
    // Crosses the entry threshold every 15 steps; passes through the dead zone.
    if (step / 15) % 2 == 0 { 0.11 } else { 0.07 }
}

fn noisy_peg(step: u64) -> f64 {
    0.02 * (step as f64 / 12.0).sin()
}

// ─── Hooks ──────────────────────────────────────────────────────────────────

fn low_resource(cfg: &mut EngineConfig) {
    cfg.initial.x = 0.8;
    cfg.initial.y = 6.0;
}

fn capped_multiplier(cfg: &mut EngineConfig) {
    // Uncapped, a 3.5x threshold shock scales beta by 25.5 and drains the resource.
    cfg.breaker.max_multiplier = Some(5.0);
}

fn consumption_hike(control: &mut FeedbackLoop<DecisionLog>, step: u64) {
    if step == 100 {
        let _ = control.set_structural(StructuralParams { beta: 0.03, gamma: 0.05 });
    }
}

// ─── Scenario Registry ──────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "CALM_PEG",
            label: "Calm peg, undisturbed oracle",
            category: "baseline",
            steps: 200,
            price_curve: calm,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria {
                max_population: 20.0,
                max_breaker_transitions: Some(0),
                ..Default::default()
            },
            configure: None,
            mid_event: None,
        },
        Scenario {
            name: "OSC_ARBITRAGE",
            label: "Oscillating arbitrage inside band",
            category: "baseline",
            steps: 200,
            price_curve: oscillating_arbitrage,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria {
                max_population: 20.0,
                max_breaker_transitions: Some(0),
                ..Default::default()
            },
            configure: None,
            mid_event: None,
        },
        Scenario {
            name: "FLASH_CRASH",
            label: "Five-step flash crash, then peg",
            category: "stress",
            steps: 200,
            price_curve: flash_crash,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria {
                max_breaker_transitions: Some(2),
                require_emergency: true,
                require_recovered: true,
                ..Default::default()
            },
            configure: Some(capped_multiplier),
            mid_event: None,
        },
        Scenario {
            name: "SUSTAINED_DEPEG",
            label: "Sustained depeg above entry threshold",
            category: "stress",
            steps: 200,
            price_curve: sustained_depeg,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria {
                max_breaker_transitions: Some(1),
                require_emergency: true,
                ..Default::default()
            },
            configure: None,
            mid_event: None,
        },
        Scenario {
            name: "WHIPSAW",
            label: "Whipsaw across the hysteresis band",
            category: "stress",
            steps: 150,
            price_curve: whipsaw,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria {
                // The dead-zone leg never clears the breaker.
                max_breaker_transitions: Some(1),
                require_emergency: true,
                ..Default::default()
            },
            configure: None,
            mid_event: None,
        },
        Scenario {
            name: "NOISY_ORACLE",
            label: "Noisy oracle with NaN dropouts",
            category: "oracle",
            steps: 200,
            price_curve: noisy_peg,
            noise_sigma: 0.02,
            dropout_prob: 0.05,
            criteria: PassCriteria {
                max_population: 20.0,
                ..Default::default()
            },
            configure: None,
            mid_event: None,
        },
        Scenario {
            name: "LOW_RESOURCE",
            label: "Start near collapse boundary",
            category: "recovery",
            steps: 200,
            price_curve: calm,
            noise_sigma: 0.0,
            dropout_prob: 0.0,
            criteria: PassCriteria::default(),
            configure: Some(low_resource),
            mid_event: None,
        },
        Scenario {
            name: "GOVERNANCE_SHIFT",
            label: "Structural beta raised mid-run",
            category: "governance",
            steps: 200,
            price_curve: oscillating_arbitrage,
            noise_sigma: 0.005,
            dropout_prob: 0.0,
            criteria: PassCriteria::default(),
            configure: None,
            mid_event: Some(consumption_hike),
        },
    ]
}
