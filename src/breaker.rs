// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Circuit Breaker
//
// Supervisory state machine over |dP| with a hysteresis band:
//   Normal    -> Emergency  when |dP| >= t_enter
//   Emergency -> Normal     when |dP| <= t_exit   (t_exit < t_enter)
// While in Emergency the controller switches to the recovery objective and
// structural beta is scaled by f(|dP|) = 1 + k * (|dP| / t_enter)^p.

use serde::{Deserialize, Serialize};

use crate::controller::Objective;
use crate::types::BreakerMode;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub t_enter: f64,
    pub t_exit: f64,
    pub k: f64,
    pub p: f64,
    /// Optional ceiling on the beta multiplier.
    pub max_multiplier: Option<f64>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            t_enter: 0.10,
            t_exit: 0.05,
            k: 2.0,
            p: 2.0,
            max_multiplier: None,
        }
    }
}

/// Edge taken by the state machine on one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    Tripped { magnitude: f64 },
    Cleared { magnitude: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    mode: BreakerMode,
    multiplier: f64,
    trips: u64,
    entered_at_step: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            mode: BreakerMode::Normal,
            multiplier: 1.0,
            trips: 0,
            entered_at_step: None,
        }
    }

    /// Feed one observation; returns the edge taken, if any.
    ///
    /// Inside the dead zone `t_exit < |dP| < t_enter` the mode is held.
    pub fn evaluate(&mut self, price_differential: f64, step: u64) -> Option<Transition> {
        let magnitude = price_differential.abs();
        let transition = match self.mode {
            BreakerMode::Normal if magnitude >= self.settings.t_enter => {
                self.mode = BreakerMode::Emergency;
                self.trips += 1;
                self.entered_at_step = Some(step);
                tracing::warn!(step, magnitude, t_enter = self.settings.t_enter, "circuit breaker tripped");
                Some(Transition::Tripped { magnitude })
            }
            BreakerMode::Emergency if magnitude <= self.settings.t_exit => {
                self.mode = BreakerMode::Normal;
                let held_for = self.entered_at_step.map(|s| step.saturating_sub(s));
                self.entered_at_step = None;
                tracing::warn!(step, magnitude, ?held_for, "circuit breaker cleared");
                Some(Transition::Cleared { magnitude })
            }
            _ => None,
        };

        self.multiplier = match self.mode {
            BreakerMode::Emergency => self.multiplier_for(magnitude),
            BreakerMode::Normal => 1.0,
        };
        transition
    }

    /// Emergency beta multiplier `1 + k * (|dP| / t_enter)^p`.
    pub fn multiplier_for(&self, price_differential: f64) -> f64 {
        let s = &self.settings;
        let ratio = price_differential.abs() / s.t_enter;
        let f = 1.0 + s.k * ratio.powf(s.p);
        match s.max_multiplier {
            Some(cap) => f.min(cap),
            None => f,
        }
    }

    pub fn mode(&self) -> BreakerMode {
        self.mode
    }

    pub fn beta_multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn effective_beta(&self, structural_beta: f64) -> f64 {
        structural_beta * self.multiplier
    }

    pub fn objective(&self) -> Objective {
        match self.mode {
            BreakerMode::Normal => Objective::Tracking,
            BreakerMode::Emergency => Objective::Recovery,
        }
    }

    pub fn trips(&self) -> u64 {
        self.trips
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Governance replacement of thresholds; current mode is kept.
    pub fn set_settings(&mut self, settings: BreakerSettings) {
        self.settings = settings;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings::default())
    }

    #[test]
    fn starts_normal_with_unit_multiplier() {
        let b = breaker();
        assert_eq!(b.mode(), BreakerMode::Normal);
        assert_eq!(b.beta_multiplier(), 1.0);
        assert_eq!(b.objective(), Objective::Tracking);
    }

    #[test]
    fn normal_emergency_normal_sequence() {
        let mut b = breaker();
        let mut modes = vec![b.mode()];
        for (i, dp) in [0.02, 0.12, 0.08, 0.03].iter().enumerate() {
            b.evaluate(*dp, i as u64);
            if *modes.last().expect("test: non-empty") != b.mode() {
                modes.push(b.mode());
            }
        }
        assert_eq!(modes, vec![BreakerMode::Normal, BreakerMode::Emergency, BreakerMode::Normal]);
        assert_eq!(b.trips(), 1);
    }

    #[test]
    fn dead_zone_holds_both_modes() {
        let mut b = breaker();
        for step in 0..10 {
            assert!(b.evaluate(0.07, step).is_none());
            assert_eq!(b.mode(), BreakerMode::Normal);
        }
        assert!(matches!(b.evaluate(-0.10, 10), Some(Transition::Tripped { .. })));
        for step in 11..20 {
            assert!(b.evaluate(0.07, step).is_none());
            assert_eq!(b.mode(), BreakerMode::Emergency);
        }
        assert!(matches!(b.evaluate(0.05, 20), Some(Transition::Cleared { .. })));
    }

    #[test]
    fn emergency_scales_beta_strictly_above_structural() {
        let mut b = breaker();
        b.evaluate(0.20, 0);
        assert_eq!(b.mode(), BreakerMode::Emergency);
        assert_eq!(b.objective(), Objective::Recovery);
        // 1 + 2 * 2^2 = 9
        assert!((b.beta_multiplier() - 9.0).abs() < 1e-12);
        assert!(b.effective_beta(0.02) > 0.02);

        b.evaluate(0.0, 1);
        assert_eq!(b.beta_multiplier(), 1.0);
        assert_eq!(b.effective_beta(0.02), 0.02);
    }

    #[test]
    fn multiplier_is_superlinear_and_capped() {
        let b = breaker();
        let m1 = b.multiplier_for(0.1) - 1.0;
        let m2 = b.multiplier_for(0.2) - 1.0;
        assert!(m2 > 2.0 * m1, "p > 1 makes the response superlinear");

        let capped = CircuitBreaker::new(BreakerSettings { max_multiplier: Some(4.0), ..Default::default() });
        assert_eq!(capped.multiplier_for(10.0), 4.0);
    }
}
