//! Adapter layer: converts the engine's f64 control decisions into the
//! fixed-point `Decimal` directives consumed by the settlement collaborator.
//!
//! The engine never mutates a ledger. A directive only states the rates in
//! force for one control step; translating them into mint/burn/fee actions is
//! the collaborator's job.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{BreakerMode, ControlDecision, DecisionSource};

/// Decimal places carried by every rate in a directive.
pub const RATE_SCALE: u32 = 12;

/// Convert f64 to Decimal at [`RATE_SCALE`]; non-finite input maps to zero.
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Rates for one control step, in ledger units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDirective {
    pub step: u64,
    /// Creation rate alpha.
    pub emission_rate: Decimal,
    /// Conversion efficiency delta.
    pub conversion_rate: Decimal,
    /// Effective consumption efficiency, emergency multiplier included.
    pub consumption_rate: Decimal,
    pub emergency: bool,
    /// The controller did not produce a fresh signal this step.
    pub held: bool,
}

impl LedgerDirective {
    pub fn from_decision(decision: &ControlDecision) -> Self {
        Self {
            step: decision.step,
            emission_rate: to_decimal(decision.alpha),
            conversion_rate: to_decimal(decision.delta),
            consumption_rate: to_decimal(decision.beta_effective),
            emergency: decision.breaker == BreakerMode::Emergency,
            held: decision.source != DecisionSource::Optimized,
        }
    }

    /// Supply the collaborator may create over `interval` time units at the
    /// current emission rate, given the circulating amount.
    pub fn mint_allowance(&self, circulating: Decimal, interval: Decimal) -> Decimal {
        (self.emission_rate * circulating * interval).round_dp_with_strategy(RATE_SCALE, RoundingStrategy::ToZero)
    }
}

impl From<&ControlDecision> for LedgerDirective {
    fn from(decision: &ControlDecision) -> Self {
        Self::from_decision(decision)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlSignal;
    use rust_decimal_macros::dec;

    fn decision(source: DecisionSource, breaker: BreakerMode) -> ControlDecision {
        ControlDecision {
            step: 7,
            t: 7.0,
            alpha: 0.1,
            delta: 0.0125,
            beta_effective: 0.18,
            breaker,
            source,
            signal: ControlSignal::default(),
        }
    }

    #[test]
    fn rates_are_fixed_point_at_twelve_places() {
        let d = LedgerDirective::from_decision(&decision(DecisionSource::Optimized, BreakerMode::Normal));
        assert_eq!(d.emission_rate, dec!(0.1));
        assert_eq!(d.conversion_rate, dec!(0.0125));
        assert_eq!(d.consumption_rate, dec!(0.18));
        assert!(d.emission_rate.scale() <= RATE_SCALE);
        assert!(!d.emergency);
        assert!(!d.held);

        let third = to_decimal(1.0 / 3.0);
        assert_eq!(third, dec!(0.333333333333));
    }

    #[test]
    fn flags_follow_breaker_and_source() {
        let d: LedgerDirective = (&decision(DecisionSource::HeldTimeout, BreakerMode::Emergency)).into();
        assert!(d.emergency);
        assert!(d.held);
    }

    #[test]
    fn non_finite_maps_to_zero() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
        assert_eq!(from_decimal(dec!(0.25)), 0.25);
    }

    #[test]
    fn mint_allowance_scales_with_supply() {
        let d = LedgerDirective::from_decision(&decision(DecisionSource::Optimized, BreakerMode::Normal));
        assert_eq!(d.mint_allowance(dec!(1000), dec!(1)), dec!(100));
        assert_eq!(d.mint_allowance(dec!(1000), dec!(0.5)), dec!(50));
        assert_eq!(d.mint_allowance(Decimal::ZERO, dec!(1)), Decimal::ZERO);
    }
}
