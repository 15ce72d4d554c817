use chain_client::ChainError;
use core_types::PortfolioId;
use executor::ExecutorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("Policy error: {0}")]
    Policy(#[from] policy::PolicyError),

    #[error("Chain call failed: {0}")]
    Chain(#[from] ExecutorError<ChainError>),

    #[error("Portfolio '{0}' is already registered.")]
    PortfolioExists(PortfolioId),

    #[error("Portfolio '{0}' not found in the scheduler.")]
    PortfolioNotFound(PortfolioId),
}
