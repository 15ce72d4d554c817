use crate::error::PolicyError;
use configuration::{CostBenefitConfig, DriftConfig};
use core_types::{
    EstimatedImpact, PortfolioId, PortfolioSnapshot, RebalanceOpportunity, Urgency,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Deviation levels that separate low, medium and high urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyBands {
    pub high: Decimal,
    pub medium: Decimal,
    /// Volatility above which any opportunity is at least medium urgency.
    pub volatility_promotion: Decimal,
}

impl From<&DriftConfig> for UrgencyBands {
    fn from(config: &DriftConfig) -> Self {
        Self {
            high: config.high_urgency_threshold,
            medium: config.medium_urgency_threshold,
            volatility_promotion: config.volatility_promotion_threshold,
        }
    }
}

/// Estimates what a rebalance would trade and cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    pub cost_rate: Decimal,
    pub improvement_rate: Decimal,
    pub trade_volume_factor: Decimal,
}

impl From<&CostBenefitConfig> for CostModel {
    fn from(config: &CostBenefitConfig) -> Self {
        Self {
            cost_rate: config.cost_rate,
            improvement_rate: config.improvement_rate,
            trade_volume_factor: config.trade_volume_factor,
        }
    }
}

impl CostModel {
    /// Impact of closing `total_deviation` (sum of absolute deviations) on a
    /// portfolio worth `total_value`.
    pub fn estimate(&self, total_value: Decimal, total_deviation: Decimal) -> EstimatedImpact {
        let trade_volume = total_value * total_deviation * self.trade_volume_factor;
        EstimatedImpact {
            trade_volume,
            estimated_cost: trade_volume * self.cost_rate,
            expected_improvement: total_deviation * self.improvement_rate,
        }
    }
}

/// A stateless calculator that turns a snapshot and a target into an opportunity.
#[derive(Debug, Clone)]
pub struct DriftEvaluator {
    bands: UrgencyBands,
    cost_model: CostModel,
}

impl DriftEvaluator {
    pub fn new(bands: UrgencyBands, cost_model: CostModel) -> Result<Self, PolicyError> {
        if bands.medium > bands.high {
            return Err(PolicyError::InvalidParameters(
                "medium urgency band cannot exceed the high band".to_string(),
            ));
        }
        if cost_model.cost_rate.is_sign_negative()
            || cost_model.improvement_rate.is_sign_negative()
            || cost_model.trade_volume_factor.is_sign_negative()
        {
            return Err(PolicyError::InvalidParameters(
                "cost model rates must be non-negative".to_string(),
            ));
        }
        Ok(Self { bands, cost_model })
    }

    pub fn from_config(drift: &DriftConfig, cost: &CostBenefitConfig) -> Result<Self, PolicyError> {
        Self::new(drift.into(), cost.into())
    }

    /// Compares `snapshot` against `target` and returns an opportunity when the
    /// largest absolute deviation strictly exceeds `min_threshold`.
    ///
    /// Only assets named in `target` are considered; an asset missing from the
    /// snapshot counts as weight zero. `volatility` is the ambient market
    /// volatility in `[0, 1]` and can only raise urgency.
    pub fn evaluate(
        &self,
        portfolio_id: &PortfolioId,
        snapshot: &PortfolioSnapshot,
        target: &BTreeMap<String, Decimal>,
        min_threshold: Decimal,
        volatility: Decimal,
    ) -> Option<RebalanceOpportunity> {
        let deviations: BTreeMap<String, Decimal> = target
            .iter()
            .map(|(asset, target_weight)| {
                (asset.clone(), snapshot.weight_of(asset) - *target_weight)
            })
            .collect();

        let max_deviation = deviations
            .values()
            .map(|d| d.abs())
            .max()
            .unwrap_or(Decimal::ZERO);

        if max_deviation <= min_threshold {
            return None;
        }

        let mut opportunity = RebalanceOpportunity {
            portfolio_id: portfolio_id.clone(),
            urgency: self.classify(max_deviation, volatility),
            estimated_impact: EstimatedImpact::default(),
            deviations,
            max_deviation,
        };
        opportunity.estimated_impact = self
            .cost_model
            .estimate(snapshot.total_value, opportunity.total_deviation());
        Some(opportunity)
    }

    /// Maps a deviation to an urgency band. The high band includes its lower
    /// edge, so exactly 0.15 is high; the medium band starts strictly above its edge.
    pub fn classify(&self, max_deviation: Decimal, volatility: Decimal) -> Urgency {
        let urgency = if max_deviation >= self.bands.high {
            Urgency::High
        } else if max_deviation > self.bands.medium {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        if volatility > self.bands.volatility_promotion {
            urgency.at_least(Urgency::Medium)
        } else {
            urgency
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::AssetHolding;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn evaluator() -> DriftEvaluator {
        DriftEvaluator::from_config(&DriftConfig::default(), &CostBenefitConfig::default()).unwrap()
    }

    fn snapshot(total_value: Decimal, weights: &[(&str, Decimal)]) -> PortfolioSnapshot {
        PortfolioSnapshot {
            total_value,
            assets: weights
                .iter()
                .map(|(asset, weight)| {
                    (
                        asset.to_string(),
                        AssetHolding { weight: *weight, value: total_value * *weight },
                    )
                })
                .collect(),
        }
    }

    fn half_half() -> BTreeMap<String, Decimal> {
        BTreeMap::from([("X".to_string(), dec!(0.5)), ("Y".to_string(), dec!(0.5))])
    }

    #[test]
    fn large_drift_is_a_high_urgency_opportunity() {
        let id = PortfolioId::new("alpha");
        let snap = snapshot(dec!(10000), &[("X", dec!(0.65)), ("Y", dec!(0.35))]);

        let opportunity = evaluator()
            .evaluate(&id, &snap, &half_half(), dec!(0.05), Decimal::ZERO)
            .expect("drift of 0.15 should be an opportunity");

        assert_eq!(opportunity.max_deviation, dec!(0.15));
        assert_eq!(opportunity.urgency, Urgency::High);
        assert_eq!(opportunity.deviations["X"], dec!(0.15));
        assert_eq!(opportunity.deviations["Y"], dec!(-0.15));
        // 10000 * 0.30 * 0.5
        assert_eq!(opportunity.estimated_impact.trade_volume, dec!(1500));
        assert_eq!(opportunity.estimated_impact.estimated_cost, dec!(1.5));
        assert_eq!(opportunity.estimated_impact.expected_improvement, dec!(0.006));
    }

    #[test]
    fn small_drift_is_within_tolerance() {
        let snap = snapshot(dec!(10000), &[("X", dec!(0.52)), ("Y", dec!(0.48))]);
        let result = evaluator().evaluate(&"alpha".into(), &snap, &half_half(), dec!(0.05), Decimal::ZERO);
        assert!(result.is_none());
    }

    #[test]
    fn deviation_equal_to_threshold_is_not_an_opportunity() {
        let snap = snapshot(dec!(100), &[("X", dec!(0.55)), ("Y", dec!(0.45))]);
        let eval = evaluator();
        assert!(eval.evaluate(&"a".into(), &snap, &half_half(), dec!(0.05), Decimal::ZERO).is_none());
        assert!(eval.evaluate(&"a".into(), &snap, &half_half(), dec!(0.049), Decimal::ZERO).is_some());
    }

    #[test]
    fn missing_assets_count_as_zero_weight_and_extras_are_ignored() {
        let snap = snapshot(dec!(100), &[("X", dec!(0.7)), ("Z", dec!(0.3))]);
        let opportunity = evaluator()
            .evaluate(&"a".into(), &snap, &half_half(), dec!(0.05), Decimal::ZERO)
            .unwrap();

        assert_eq!(opportunity.deviations.len(), 2);
        assert_eq!(opportunity.deviations["Y"], dec!(-0.5));
        assert!(!opportunity.deviations.contains_key("Z"));
        assert_eq!(opportunity.max_deviation, dec!(0.5));
    }

    #[test]
    fn urgency_bands() {
        let eval = evaluator();
        assert_eq!(eval.classify(dec!(0.06), Decimal::ZERO), Urgency::Low);
        assert_eq!(eval.classify(dec!(0.12), Decimal::ZERO), Urgency::Medium);
        assert_eq!(eval.classify(dec!(0.16), Decimal::ZERO), Urgency::High);
    }

    #[test]
    fn band_edges() {
        let eval = evaluator();
        assert_eq!(eval.classify(dec!(0.10), Decimal::ZERO), Urgency::Low);
        assert_eq!(eval.classify(dec!(0.1001), Decimal::ZERO), Urgency::Medium);
        assert_eq!(eval.classify(dec!(0.1499), Decimal::ZERO), Urgency::Medium);
        assert_eq!(eval.classify(dec!(0.15), Decimal::ZERO), Urgency::High);
    }

    #[test]
    fn high_volatility_promotes_low_urgency_only_up_to_medium() {
        let eval = evaluator();
        assert_eq!(eval.classify(dec!(0.06), dec!(0.25)), Urgency::Low);
        assert_eq!(eval.classify(dec!(0.06), dec!(0.26)), Urgency::Medium);
        assert_eq!(eval.classify(dec!(0.20), dec!(0.90)), Urgency::High);
    }

    #[test]
    fn inverted_bands_are_rejected() {
        let bands = UrgencyBands { high: dec!(0.1), medium: dec!(0.2), volatility_promotion: dec!(0.25) };
        let cost = CostModel::from(&CostBenefitConfig::default());
        assert!(DriftEvaluator::new(bands, cost).is_err());
    }

    proptest! {
        #[test]
        fn evaluation_is_deterministic(
            x in 0u32..=1000,
            y in 0u32..=1000,
            threshold in 0u32..=200,
            volatility in 0u32..=100,
        ) {
            let snap = snapshot(dec!(5000), &[
                ("X", Decimal::new(x.into(), 3)),
                ("Y", Decimal::new(y.into(), 3)),
            ]);
            let threshold = Decimal::new(threshold.into(), 3);
            let volatility = Decimal::new(volatility.into(), 2);
            let eval = evaluator();
            let id = PortfolioId::new("p");

            let first = eval.evaluate(&id, &snap, &half_half(), threshold, volatility);
            let second = eval.evaluate(&id, &snap, &half_half(), threshold, volatility);
            prop_assert_eq!(&first, &second);

            match first {
                Some(opportunity) => prop_assert!(opportunity.max_deviation > threshold),
                None => {
                    let max = (snap.weight_of("X") - dec!(0.5)).abs().max((snap.weight_of("Y") - dec!(0.5)).abs());
                    prop_assert!(max <= threshold);
                }
            }
        }
    }
}
