use crate::error::PolicyError;
use configuration::CostBenefitConfig;
use core_types::RebalanceOpportunity;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Expected improvement must exceed this multiple of the estimated cost.
/// Keeps marginal, fee-losing rebalances from executing.
pub const DEFAULT_BENEFIT_MARGIN: Decimal = dec!(2);

/// Pass/fail decision on whether an opportunity is worth executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostBenefitGate {
    benefit_margin: Decimal,
}

impl Default for CostBenefitGate {
    fn default() -> Self {
        Self { benefit_margin: DEFAULT_BENEFIT_MARGIN }
    }
}

impl CostBenefitGate {
    pub fn new(benefit_margin: Decimal) -> Result<Self, PolicyError> {
        if benefit_margin.is_sign_negative() {
            return Err(PolicyError::InvalidParameters(
                "benefit_margin must be non-negative".to_string(),
            ));
        }
        Ok(Self { benefit_margin })
    }

    pub fn from_config(config: &CostBenefitConfig) -> Result<Self, PolicyError> {
        Self::new(config.benefit_margin)
    }

    pub fn benefit_margin(&self) -> Decimal {
        self.benefit_margin
    }

    /// True only when the expected improvement strictly exceeds
    /// `benefit_margin × estimated_cost`.
    pub fn should_execute(&self, opportunity: &RebalanceOpportunity) -> bool {
        let impact = &opportunity.estimated_impact;
        let execute = impact.expected_improvement > self.benefit_margin * impact.estimated_cost;

        tracing::debug!(
            portfolio_id = %opportunity.portfolio_id,
            expected_improvement = %impact.expected_improvement,
            estimated_cost = %impact.estimated_cost,
            execute,
            "Cost-benefit gate evaluated."
        );
        execute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{EstimatedImpact, Urgency};
    use std::collections::BTreeMap;

    fn opportunity(expected_improvement: Decimal, estimated_cost: Decimal) -> RebalanceOpportunity {
        RebalanceOpportunity {
            portfolio_id: "alpha".into(),
            deviations: BTreeMap::new(),
            max_deviation: dec!(0.2),
            urgency: Urgency::High,
            estimated_impact: EstimatedImpact {
                trade_volume: Decimal::ZERO,
                estimated_cost,
                expected_improvement,
            },
        }
    }

    #[test]
    fn improvement_exactly_at_margin_is_refused() {
        let gate = CostBenefitGate::default();
        assert!(!gate.should_execute(&opportunity(dec!(0.006), dec!(0.003))));
        assert!(gate.should_execute(&opportunity(dec!(0.0061), dec!(0.003))));
    }

    #[test]
    fn costly_rebalances_are_refused() {
        let gate = CostBenefitGate::default();
        assert!(!gate.should_execute(&opportunity(dec!(0.006), dec!(1.5))));
    }

    #[test]
    fn margin_is_overridable() {
        let gate = CostBenefitGate::new(dec!(1)).unwrap();
        assert!(gate.should_execute(&opportunity(dec!(0.004), dec!(0.003))));
        assert!(CostBenefitGate::new(dec!(-1)).is_err());
    }
}
