// Per-Step JSONL Time Series Recorder
// Outputs one JSON line per control step for independent analysis

use ecology_engine::{Diagnostics, StepReport};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct StepSnapshot {
    pub step: u64,
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub x_eq: Option<f64>,
    pub y_eq: Option<f64>,
    pub observed_price_differential: f64,
    pub alpha: f64,
    pub delta: f64,
    pub beta_effective: f64,
    pub beta_multiplier: f64,
    pub u_alpha: f64,
    pub u_delta: f64,
    pub mode: &'static str,
    pub source: String,
    pub cost: Option<f64>,
    pub invariant_drift: f64,
}

impl StepSnapshot {
    pub fn capture(observed: f64, report: &StepReport, diag: &Diagnostics) -> Self {
        let d = &report.decision;
        Self {
            step: d.step,
            t: diag.t,
            x: diag.x,
            y: diag.y,
            x_eq: diag.equilibrium.map(|e| e.0),
            y_eq: diag.equilibrium.map(|e| e.1),
            observed_price_differential: observed,
            alpha: d.alpha,
            delta: d.delta,
            beta_effective: d.beta_effective,
            beta_multiplier: diag.beta_multiplier,
            u_alpha: d.signal.u_alpha,
            u_delta: d.signal.u_delta,
            mode: d.breaker.label(),
            source: format!("{:?}", d.source),
            cost: report.cost,
            invariant_drift: diag.invariant_drift,
        }
    }
}

/// Accumulates snapshots and writes JSONL.
pub struct TimeSeriesRecorder {
    snapshots: Vec<StepSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn record(&mut self, snapshot: StepSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
