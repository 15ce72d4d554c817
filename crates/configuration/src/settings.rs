use crate::error::ConfigError;
use core_types::{PortfolioId, RiskTolerance};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section falls back to its defaults, so an empty file is a valid config.
/// Unknown keys are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub resilience: ResilienceConfig,
    pub drift: DriftConfig,
    pub cost_benefit: CostBenefitConfig,
    pub metrics: MetricsConfig,
    pub chain: ChainConfig,
    pub logging: LoggingConfig,
    pub telegram: TelegramConfig,
    pub portfolios: Vec<PortfolioConfig>,
}

impl Config {
    /// Checks the whole configuration for values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.resilience.validate()?;
        self.drift.validate()?;
        self.cost_benefit.validate()?;

        let mut seen = HashSet::new();
        for portfolio in &self.portfolios {
            portfolio.validate()?;
            if !seen.insert(portfolio.id.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "portfolio '{}' is configured more than once",
                    portfolio.id
                )));
            }
        }
        Ok(())
    }
}

/// Cadences and concurrency of the rebalancing scheduler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Spacing of opportunity scans (default 30 minutes).
    pub scan_interval_ms: u64,
    /// Spacing of periodic metrics reports (default 6 hours).
    pub report_interval_ms: u64,
    /// Upper bound on portfolios evaluated at once within a tick. `None` is unlimited.
    pub max_concurrency: Option<usize>,
    /// Window used for `recent_rebalances` in the status view and reports.
    pub status_window_ms: u64,
    /// Breaker name guarding snapshot reads.
    pub snapshot_operation: String,
    /// Breaker name guarding rebalance submissions.
    pub rebalance_operation: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 1_800_000,
            report_interval_ms: 21_600_000,
            max_concurrency: None,
            status_window_ms: 86_400_000,
            snapshot_operation: "get_snapshot".to_string(),
            rebalance_operation: "submit_rebalance".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn status_window(&self) -> Duration {
        Duration::from_millis(self.status_window_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_ms == 0 || self.report_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler intervals must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::ValidationError(
                "scheduler.max_concurrency must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry, timeout and circuit breaker settings for every outbound call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Exclusive upper bound of the uniform jitter added to each backoff.
    pub max_jitter_ms: u64,
    /// Hard limit on a single attempt.
    pub timeout_ms: u64,
    /// Fixed seed for the jitter RNG. Unset seeds from entropy.
    pub rng_seed: Option<u64>,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
            timeout_ms: 30_000,
            rng_seed: None,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ResilienceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.max_retries must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "resilience.base_delay_ms cannot exceed max_delay_ms".to_string(),
            ));
        }
        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "circuit breaker thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker again.
    pub success_threshold: u32,
    /// How long an open breaker rejects calls before probing.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown_ms: 60_000,
        }
    }
}

/// Urgency bands for drift classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub high_urgency_threshold: Decimal,
    pub medium_urgency_threshold: Decimal,
    /// Market volatility above which urgency is raised to at least medium.
    pub volatility_promotion_threshold: Decimal,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            high_urgency_threshold: dec!(0.15),
            medium_urgency_threshold: dec!(0.10),
            volatility_promotion_threshold: dec!(0.25),
        }
    }
}

impl DriftConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.medium_urgency_threshold > self.high_urgency_threshold {
            return Err(ConfigError::ValidationError(
                "drift.medium_urgency_threshold cannot exceed high_urgency_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the cost-vs-benefit gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostBenefitConfig {
    /// Trading cost as a fraction of traded volume (0.001 = 10 bps).
    pub cost_rate: Decimal,
    /// Expected improvement per unit of total absolute deviation.
    pub improvement_rate: Decimal,
    /// Improvement must exceed this multiple of the cost.
    pub benefit_margin: Decimal,
    /// Share of the total deviation that has to be traded (each unit sold is bought elsewhere).
    pub trade_volume_factor: Decimal,
}

impl Default for CostBenefitConfig {
    fn default() -> Self {
        Self {
            cost_rate: dec!(0.001),
            improvement_rate: dec!(0.02),
            benefit_margin: dec!(2),
            trade_volume_factor: dec!(0.5),
        }
    }
}

impl CostBenefitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cost_rate.is_sign_negative()
            || self.improvement_rate.is_sign_negative()
            || self.benefit_margin.is_sign_negative()
            || self.trade_volume_factor.is_sign_negative()
        {
            return Err(ConfigError::ValidationError(
                "cost_benefit parameters must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retention of the rebalance history.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub max_records: usize,
    /// Records older than this are pruned. `None` keeps them until `max_records` is hit.
    pub retention_ms: Option<u64>,
    pub max_error_log: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            retention_ms: None,
            max_error_log: 100,
        }
    }
}

/// Connection settings for the chain RPC endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub request_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: String::new(),
            request_timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "rebalancer".to_string(),
        }
    }
}

/// Telegram credentials. Leaving either field empty disables alerting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// Per-portfolio options recognised at `add_portfolio` time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PortfolioConfig {
    pub id: PortfolioId,
    /// Asset symbol to target weight. Weights need not sum to one.
    pub target_allocation: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub target_shorts: BTreeMap<String, Decimal>,
    #[serde(default = "default_min_deviation_threshold")]
    pub min_deviation_threshold: Decimal,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
}

fn default_min_deviation_threshold() -> Decimal {
    dec!(0.05)
}

fn default_interval_ms() -> u64 {
    3_600_000
}

impl PortfolioConfig {
    /// A config with the given target and every other option at its default.
    pub fn new(id: impl Into<PortfolioId>, target_allocation: BTreeMap<String, Decimal>) -> Self {
        Self {
            id: id.into(),
            target_allocation,
            target_shorts: BTreeMap::new(),
            min_deviation_threshold: default_min_deviation_threshold(),
            interval_ms: default_interval_ms(),
            risk_tolerance: RiskTolerance::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(format!(
                "portfolio '{}': {}",
                self.id, reason
            )))
        };

        if self.target_allocation.is_empty() {
            return invalid("target_allocation must name at least one asset");
        }
        if self
            .target_allocation
            .values()
            .chain(self.target_shorts.values())
            .any(|w| w.is_sign_negative())
        {
            return invalid("target weights must be non-negative");
        }
        if self.min_deviation_threshold < Decimal::ZERO || self.min_deviation_threshold > Decimal::ONE {
            return invalid("min_deviation_threshold must be within [0, 1]");
        }
        if self.interval_ms == 0 {
            return invalid("interval_ms must be greater than 0");
        }
        Ok(())
    }
}
