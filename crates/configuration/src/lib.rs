use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    ChainConfig, CircuitBreakerConfig, Config, CostBenefitConfig, DriftConfig, LoggingConfig,
    MetricsConfig, PortfolioConfig, ResilienceConfig, SchedulerConfig, TelegramConfig,
};

/// Prefix of environment variables that override file settings,
/// e.g. `REBALANCER__CHAIN__RPC_URL`.
pub const ENV_PREFIX: &str = "REBALANCER";

/// Command-line arguments that locate the configuration file.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', default_value = "config.toml")]
    pub config: std::path::PathBuf,
}

/// Loads and validates the application configuration.
///
/// The file at `path` is optional: a missing file yields the defaults, further
/// overridden by `REBALANCER__*` environment variables.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Parses and validates configuration from an in-memory TOML document.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::RiskTolerance;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_from_str("").unwrap();

        assert_eq!(config.scheduler.scan_interval_ms, 1_800_000);
        assert_eq!(config.scheduler.report_interval_ms, 21_600_000);
        assert_eq!(config.scheduler.max_concurrency, None);
        assert_eq!(config.resilience.max_retries, 3);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.resilience.circuit_breaker.cooldown_ms, 60_000);
        assert_eq!(config.cost_benefit.benefit_margin, dec!(2));
        assert!(config.portfolios.is_empty());
    }

    #[test]
    fn portfolio_options_default_and_unknown_keys_are_ignored() {
        let config = load_config_from_str(
            r#"
            [scheduler]
            scan_interval_ms = 60000
            flux_capacitor = true

            [[portfolios]]
            id = "alpha"
            target_allocation = { eth = 0.5, btc = 0.5 }
            favourite_colour = "teal"

            [[portfolios]]
            id = "beta"
            target_allocation = { eth = 1.0 }
            min_deviation_threshold = 0.1
            interval_ms = 600000
            risk_tolerance = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.scan_interval_ms, 60_000);
        let alpha = &config.portfolios[0];
        assert_eq!(alpha.id.as_str(), "alpha");
        assert_eq!(alpha.target_allocation["eth"], dec!(0.5));
        assert_eq!(alpha.min_deviation_threshold, dec!(0.05));
        assert_eq!(alpha.interval_ms, 3_600_000);
        assert_eq!(alpha.risk_tolerance, RiskTolerance::Medium);

        let beta = &config.portfolios[1];
        assert_eq!(beta.min_deviation_threshold, dec!(0.1));
        assert_eq!(beta.interval_ms, 600_000);
        assert_eq!(beta.risk_tolerance, RiskTolerance::High);
    }

    #[test]
    fn duplicate_portfolio_ids_are_rejected() {
        let result = load_config_from_str(
            r#"
            [[portfolios]]
            id = "alpha"
            target_allocation = { eth = 1.0 }

            [[portfolios]]
            id = "alpha"
            target_allocation = { btc = 1.0 }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn malformed_portfolios_fail_validation() {
        let mut portfolio = PortfolioConfig::new("alpha", [("ETH".to_string(), dec!(1))].into());
        assert!(portfolio.validate().is_ok());

        portfolio.interval_ms = 0;
        assert!(portfolio.validate().is_err());

        portfolio.interval_ms = 1_000;
        portfolio.target_allocation.insert("BTC".to_string(), dec!(-0.1));
        assert!(portfolio.validate().is_err());

        let empty = PortfolioConfig::new("empty", Default::default());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let result = load_config_from_str("[resilience]\nmax_retries = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
