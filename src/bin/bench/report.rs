// Benchmark Report Types
// Structured output for offline analysis of control-loop behaviour

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub category: String,
    pub seed: u64,
    pub pass: bool,
    pub steps_completed: u64,
    pub halted: bool,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub final_x: f64,
    pub final_y: f64,
    pub mean_tracking_error: f64,
    pub breaker_transitions: u64,
    pub emergency_steps: u64,
    pub peak_beta_multiplier: f64,
    pub final_mode: &'static str,
    pub held_infeasible: u32,
    pub held_timeout: u32,
    pub held_invalid_observation: u32,
    pub held_forecast_failure: u32,
    pub total_holds: u32,
    pub degeneracies: u32,
    pub oracle_dropouts: u64,
    pub mean_cost: f64,
    pub invariant_drift: f64,
    pub max_step_drift: f64,
    pub elapsed_ms: u128,
    pub steps_per_sec: f64,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub min_x: Stats,
    pub max_x: Stats,
    pub mean_tracking_error: Stats,
    pub breaker_transitions: Stats,
    pub emergency_steps: Stats,
    pub peak_beta_multiplier: Stats,
    pub holds: Stats,
    pub mean_cost: Stats,
    pub elapsed_ms: Stats,
    pub steps_per_sec: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Suite Validation Summary ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    /// No run in any scenario drove the resource to the floor.
    pub no_collapse: bool,
    /// No run tripped the consecutive-degeneracy halt.
    pub no_halt: bool,
    /// Every stress run entered Emergency.
    pub breaker_engaged_under_stress: bool,
    /// Lowest resource level observed across the suite.
    pub global_min_x: f64,
}

impl ValidationSummary {
    pub fn all_pass(&self) -> bool {
        self.no_collapse && self.no_halt && self.breaker_engaged_under_stress
    }
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub horizon_steps: usize,
    pub summary: Summary,
    pub validation: ValidationSummary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_known_samples() {
        let s = Stats::from_samples(&[1.0, 2.0, 3.0, 4.0]);
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.std_dev - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert!(s.ci_lower < s.mean && s.mean < s.ci_upper);
    }

    #[test]
    fn stats_of_nothing_is_zeroed() {
        let s = Stats::from_samples(&[]);
        assert_eq!(s.n, 0);
        assert_eq!(s.mean, 0.0);
    }
}
