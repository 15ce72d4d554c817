use crate::enums::{ErrorKind, RiskTolerance, Urgency};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque, unique key of a managed portfolio.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortfolioId(String);

impl PortfolioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortfolioId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PortfolioId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The current holding of a single asset inside a portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHolding {
    /// Fraction of the portfolio's total value held in this asset.
    pub weight: Decimal,
    /// Value of the holding, in the portfolio's quote currency.
    pub value: Decimal,
}

/// A read-only view of a portfolio as reported by the chain client.
///
/// The scheduler never caches or mutates a snapshot; a fresh one is fetched on
/// every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_value: Decimal,
    pub assets: BTreeMap<String, AssetHolding>,
}

impl PortfolioSnapshot {
    /// Current weight of `asset`, or zero when the portfolio does not hold it.
    pub fn weight_of(&self, asset: &str) -> Decimal {
        self.assets
            .get(asset)
            .map(|holding| holding.weight)
            .unwrap_or(Decimal::ZERO)
    }
}

/// The estimated economics of executing a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub trade_volume: Decimal,
    pub estimated_cost: Decimal,
    pub expected_improvement: Decimal,
}

/// A portfolio found out of tolerance. Derived per evaluation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOpportunity {
    pub portfolio_id: PortfolioId,
    /// Signed `current - target` weight per target asset.
    pub deviations: BTreeMap<String, Decimal>,
    pub max_deviation: Decimal,
    pub urgency: Urgency,
    pub estimated_impact: EstimatedImpact,
}

impl RebalanceOpportunity {
    /// Sum of absolute deviations across all target assets.
    pub fn total_deviation(&self) -> Decimal {
        self.deviations.values().map(|d| d.abs()).sum()
    }
}

/// The corrective action submitted to the chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRequest {
    pub portfolio_id: PortfolioId,
    pub weights: BTreeMap<String, Decimal>,
    pub shorts: BTreeMap<String, Decimal>,
    pub risk_tolerance: RiskTolerance,
}

/// What the chain reports back after a rebalance submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub success: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The outcome of one resilient execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<ErrorKind>,
    pub tx_hash: Option<String>,
    pub message: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(duration_ms: u64, tx_hash: Option<String>) -> Self {
        Self {
            success: true,
            duration_ms,
            error: None,
            tx_hash,
            message: None,
        }
    }

    pub fn failed(duration_ms: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            error: Some(kind),
            tx_hash: None,
            message: Some(message.into()),
        }
    }
}

/// One attempted rebalance, as kept in the metrics history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub portfolio_id: PortfolioId,
    pub max_deviation: Decimal,
    pub urgency: Urgency,
    pub impact: EstimatedImpact,
    pub result: ExecutionResult,
    pub success: bool,
}

impl RebalanceRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        opportunity: &RebalanceOpportunity,
        result: ExecutionResult,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp,
            portfolio_id: opportunity.portfolio_id.clone(),
            max_deviation: opportunity.max_deviation,
            urgency: opportunity.urgency,
            impact: opportunity.estimated_impact,
            success: result.success,
            result,
        }
    }
}
