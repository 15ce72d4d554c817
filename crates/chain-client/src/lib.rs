use async_trait::async_trait;
use core_types::{PortfolioId, PortfolioSnapshot, RebalanceRequest, TxReceipt};
use rust_decimal::Decimal;

pub mod error;
pub mod responses;
pub mod rpc;

// --- Public API ---
pub use error::ChainError;
pub use responses::{JsonRpcRequest, JsonRpcResponse, SnapshotResponse, SubmitResponse};
pub use rpc::RpcChainClient;

/// The abstract interface to the chain the managed portfolios live on.
/// The scheduler only talks to this trait, so the RPC implementation can be
/// swapped for a deterministic fake in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Reads the current holdings of a portfolio.
    async fn get_snapshot(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSnapshot, ChainError>;

    /// Submits new target weights and shorts for a portfolio.
    async fn submit_rebalance(&self, request: &RebalanceRequest) -> Result<TxReceipt, ChainError>;
}

/// Optional provider of a market volatility reading in `[0, 1]`.
#[async_trait]
pub trait MarketConditions: Send + Sync {
    async fn volatility(&self) -> Result<Decimal, ChainError>;
}
