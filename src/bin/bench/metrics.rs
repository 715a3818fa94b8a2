// Per-Step Metric Trackers - population envelope, breaker activity, fail-safe holds
// Accumulated from committed step reports; no engine internals are touched

use ecology_engine::*;

// ─── Population Envelope ────────────────────────────────────────────────────

/// Running extremes of both populations and the tracking error against the
/// live equilibrium.
pub struct EnvelopeTracker {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    tracking_error_sum: f64,
    samples: u64,
}

impl EnvelopeTracker {
    pub fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
            tracking_error_sum: 0.0,
            samples: 0,
        }
    }

    pub fn record(&mut self, d: &Diagnostics) {
        self.min_x = self.min_x.min(d.x);
        self.max_x = self.max_x.max(d.x);
        self.min_y = self.min_y.min(d.y);
        self.max_y = self.max_y.max(d.y);
        if let Some((xe, _)) = d.equilibrium {
            if xe > 0.0 {
                self.tracking_error_sum += (d.x - xe).abs() / xe;
                self.samples += 1;
            }
        }
    }

    /// Mean relative distance of X from its live equilibrium.
    pub fn mean_tracking_error(&self) -> f64 {
        if self.samples == 0 { return 0.0; }
        self.tracking_error_sum / self.samples as f64
    }
}

// ─── Breaker Activity ───────────────────────────────────────────────────────

pub struct BreakerTracker {
    pub transitions: u64,
    pub emergency_steps: u64,
    pub peak_multiplier: f64,
}

impl BreakerTracker {
    pub fn new() -> Self {
        Self { transitions: 0, emergency_steps: 0, peak_multiplier: 1.0 }
    }

    pub fn record(&mut self, report: &StepReport, multiplier: f64) {
        if report.transition.is_some() {
            self.transitions += 1;
        }
        if report.decision.breaker == BreakerMode::Emergency {
            self.emergency_steps += 1;
        }
        self.peak_multiplier = self.peak_multiplier.max(multiplier);
    }
}

// ─── Fail-Safe Holds ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct HoldTracker {
    pub infeasible: u32,
    pub timeout: u32,
    pub invalid_observation: u32,
    pub forecast_failure: u32,
    pub degeneracies: u32,
    cost_sum: f64,
    cost_samples: u32,
}

impl HoldTracker {
    pub fn record(&mut self, report: &StepReport) {
        match report.decision.source {
            DecisionSource::Optimized => {}
            DecisionSource::HeldInfeasible => self.infeasible += 1,
            DecisionSource::HeldTimeout => self.timeout += 1,
            DecisionSource::HeldInvalidObservation => self.invalid_observation += 1,
            DecisionSource::HeldForecastFailure => self.forecast_failure += 1,
        }
        self.degeneracies += report
            .anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::NumericDegeneracy))
            .count() as u32;
        if let Some(c) = report.cost {
            self.cost_sum += c;
            self.cost_samples += 1;
        }
    }

    pub fn total_holds(&self) -> u32 {
        self.infeasible + self.timeout + self.invalid_observation + self.forecast_failure
    }

    pub fn mean_cost(&self) -> f64 {
        if self.cost_samples == 0 { return 0.0; }
        self.cost_sum / self.cost_samples as f64
    }
}
