// Ecology Engine Benchmark Runner
// Monte Carlo over oracle scenarios, seedable PRNG, per-step audit trail
//
// Usage:
//   cargo run --release --bin bench                     # Run all scenarios (10 runs each)
//   cargo run --release --bin bench -- --runs 3         # Quick mode
//   cargo run --release --bin bench -- FLASH_CRASH      # Filter by name, label or category
//   cargo run --release --bin bench -- --time-series    # Enable JSONL output
//   cargo run --release --bin bench -- --seed 42        # Custom base seed
//   cargo run --release --bin bench -- --horizon 0      # Horizon of one period (default 12)
//
// Engine logs go to stderr; RUST_LOG=ecology_engine=debug for per-step detail.

mod metrics;
mod monte_carlo;
mod noise;
mod report;
mod scenarios;
mod time_series;

use report::*;
use scenarios::*;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    horizon: usize,
    time_series: bool,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 10,
        seed: 0,
        horizon: 12,
        time_series: false,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(10);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--horizon" => {
                i += 1;
                if i < args.len() {
                    cli.horizon = args[i].parse().unwrap_or(12);
                }
            }
            "--time-series" => {
                cli.time_series = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    init_tracing();
    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = cli.time_series.then(|| std::path::PathBuf::from("benchmark-results/time-series"));

    println!("\n  Ecology Engine Benchmark Runner");
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {} | Horizon: {}",
        cli.runs, cli.seed, cli.horizon);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<38} {:>5} {:>8} {:>8} {:>9} {:>6} {:>6} {:>7}",
        "Scenario", "Pass%", "min X", "TrackErr", "Trips", "Emerg", "Holds", "Time");
    println!("  {}", "-".repeat(96));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(
            scenario,
            cli.runs,
            cli.seed,
            cli.horizon,
            ts_dir.as_deref(),
        );

        let pass_pct = report.pass_rate * 100.0;
        let status = if report.pass_rate >= 1.0 { "PASS" } else { "FAIL" };

        println!("  {:<38} {:>4}% {:>8.3} {:>8.3} {:>9.1} {:>6.0} {:>6.1} {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            report.min_x.min,
            report.mean_tracking_error.mean,
            report.breaker_transitions.mean,
            report.emergency_steps.mean,
            report.holds.mean,
            report.elapsed_ms.mean,
            status,
        );

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Suite Validation ───────────────────────────────────────────────

    let runs = || mc_reports.iter().flat_map(|r| r.individual_runs.iter());
    let validation = ValidationSummary {
        no_collapse: runs().all(|r| r.min_x > 1e-3),
        no_halt: runs().all(|r| !r.halted),
        breaker_engaged_under_stress: mc_reports.iter()
            .filter(|r| r.category == "stress")
            .all(|r| r.emergency_steps.min > 0.0),
        global_min_x: runs().map(|r| r.min_x).fold(f64::INFINITY, f64::min),
    };

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= 1.0).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(96));
    println!("  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total, passed, failed, suite_elapsed.as_secs_f64());

    println!("  Validation:");
    println!("    No collapse:            {}", if validation.no_collapse { "PASS" } else { "FAIL" });
    println!("    No halt:                {}", if validation.no_halt { "PASS" } else { "FAIL" });
    println!("    Breaker under stress:   {}", if validation.breaker_engaged_under_stress { "PASS" } else { "FAIL" });
    println!("    Global min X:           {:.4}\n", validation.global_min_x);
    let validation_passes = validation.all_pass();

    // ─── Write JSON Report ──────────────────────────────────────────────

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let timestamp = format!("{}", ts);

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        horizon_steps: cli.horizon,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
        },
        validation,
        scenarios: mc_reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("  Failed to create benchmark-results/: {}", e);
        std::process::exit(1);
    }
    let path = dir.join(format!("bench-{}.json", timestamp));
    let written = serde_json::to_string_pretty(&report)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => println!("  Results saved to: {}\n", path.display()),
        Err(e) => eprintln!("  Failed to write benchmark file: {}", e),
    }

    if failed > 0 || !validation_passes {
        std::process::exit(1);
    }
}
