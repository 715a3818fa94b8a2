// Monte Carlo Infrastructure - N runs per scenario with statistical aggregation
// Each scenario runs N times with seeds base..base+N, computing mean ± 95% CI

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ecology_engine::*;

use crate::metrics::{BreakerTracker, EnvelopeTracker, HoldTracker};
use crate::noise::OracleNoise;
use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::{StepSnapshot, TimeSeriesRecorder};

use std::time::Instant;

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    horizon_steps: usize,
    time_series_dir: Option<&std::path::Path>,
) -> BenchResult {
    let start = Instant::now();

    let mut config = EngineConfig::default();
    config.controller.horizon_steps = horizon_steps;
    if let Some(configure) = scenario.configure {
        configure(&mut config);
    }
    let cadence_ms = config.driver.cadence_ms;
    let log = DecisionLog::new(config.driver.decision_log_capacity);

    let mut control = match FeedbackLoop::new(config, log) {
        Ok(control) => control,
        Err(e) => {
            tracing::error!(scenario = scenario.name, error = %e, "scenario config rejected");
            return failed_result(scenario, seed);
        }
    };

    let mut noise = OracleNoise::new(ChaCha8Rng::seed_from_u64(seed), scenario.noise_sigma, scenario.dropout_prob);
    let mut envelope = EnvelopeTracker::new();
    let mut breaker = BreakerTracker::new();
    let mut holds = HoldTracker::default();
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());
    let mut steps_completed = 0;

    envelope.record(&control.diagnostics());

    for step in 0..scenario.steps {
        if let Some(event) = scenario.mid_event {
            event(&mut control, step);
        }

        let reading = noise.read((scenario.price_curve)(step));
        // Rejected readings are held by the loop itself.
        let _ = control.observe_price_differential(reading, step * cadence_ms);

        let report = match control.step() {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(scenario = scenario.name, seed, step, error = %e, "control loop halted");
                break;
            }
        };
        steps_completed += 1;

        let diag = control.diagnostics();
        envelope.record(&diag);
        breaker.record(&report, diag.beta_multiplier);
        holds.record(&report);
        if let Some(ref mut ts) = time_series {
            ts.record(StepSnapshot::capture(reading, &report, &diag));
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            eprintln!("  Warning: failed to write time series: {}", e);
        }
    }

    let elapsed = start.elapsed();
    let elapsed_secs = elapsed.as_secs_f64().max(0.001);
    let diag = control.diagnostics();
    let halted = control.is_halted();
    let final_mode = control.breaker().mode();

    let c = &scenario.criteria;
    let mut pass = envelope.min_x > c.min_resource
        && envelope.max_x < c.max_population
        && envelope.max_y < c.max_population;
    if let Some(max) = c.max_breaker_transitions {
        if breaker.transitions > max {
            pass = false;
        }
    }
    if c.require_emergency && breaker.emergency_steps == 0 {
        pass = false;
    }
    if c.require_no_halt && halted {
        pass = false;
    }
    if c.require_recovered && final_mode != BreakerMode::Normal {
        pass = false;
    }

    BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass,
        steps_completed,
        halted,
        min_x: envelope.min_x,
        max_x: envelope.max_x,
        min_y: envelope.min_y,
        max_y: envelope.max_y,
        final_x: diag.x,
        final_y: diag.y,
        mean_tracking_error: envelope.mean_tracking_error(),
        breaker_transitions: breaker.transitions,
        emergency_steps: breaker.emergency_steps,
        peak_beta_multiplier: breaker.peak_multiplier,
        final_mode: final_mode.label(),
        held_infeasible: holds.infeasible,
        held_timeout: holds.timeout,
        held_invalid_observation: holds.invalid_observation,
        held_forecast_failure: holds.forecast_failure,
        total_holds: holds.total_holds(),
        degeneracies: holds.degeneracies,
        oracle_dropouts: noise.dropouts,
        mean_cost: holds.mean_cost(),
        invariant_drift: diag.invariant_drift,
        max_step_drift: diag.invariant_max_step_drift,
        elapsed_ms: elapsed.as_millis(),
        steps_per_sec: steps_completed as f64 / elapsed_secs,
    }
}

fn failed_result(scenario: &Scenario, seed: u64) -> BenchResult {
    BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass: false,
        steps_completed: 0,
        halted: false,
        min_x: 0.0,
        max_x: 0.0,
        min_y: 0.0,
        max_y: 0.0,
        final_x: 0.0,
        final_y: 0.0,
        mean_tracking_error: 0.0,
        breaker_transitions: 0,
        emergency_steps: 0,
        peak_beta_multiplier: 1.0,
        final_mode: BreakerMode::Normal.label(),
        held_infeasible: 0,
        held_timeout: 0,
        held_invalid_observation: 0,
        held_forecast_failure: 0,
        total_holds: 0,
        degeneracies: 0,
        oracle_dropouts: 0,
        mean_cost: 0.0,
        invariant_drift: 0.0,
        max_step_drift: 0.0,
        elapsed_ms: 0,
        steps_per_sec: 0.0,
    }
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    horizon_steps: usize,
    time_series_base: Option<&std::path::Path>,
) -> MonteCarloReport {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        results.push(run_single(scenario, seed, horizon_steps, ts_dir.as_deref()));
    }

    aggregate(scenario, results)
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let pass_rate = if n == 0 { 0.0 } else { passed as f64 / n as f64 };

    let stat = |f: fn(&BenchResult) -> f64| Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>());

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate,
        min_x: stat(|r| r.min_x),
        max_x: stat(|r| r.max_x),
        mean_tracking_error: stat(|r| r.mean_tracking_error),
        breaker_transitions: stat(|r| r.breaker_transitions as f64),
        emergency_steps: stat(|r| r.emergency_steps as f64),
        peak_beta_multiplier: stat(|r| r.peak_beta_multiplier),
        holds: stat(|r| r.total_holds as f64),
        mean_cost: stat(|r| r.mean_cost),
        elapsed_ms: stat(|r| r.elapsed_ms as f64),
        steps_per_sec: stat(|r| r.steps_per_sec),
        individual_runs: results,
    }
}
