use crate::error::ChainError;
use crate::responses::{JsonRpcRequest, JsonRpcResponse, SnapshotResponse, SubmitResponse};
use crate::{ChainClient, MarketConditions};
use async_trait::async_trait;
use configuration::ChainConfig;
use core_types::{PortfolioId, PortfolioSnapshot, RebalanceRequest, TxReceipt};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const METHOD_GET_SNAPSHOT: &str = "rebalancer_getSnapshot";
pub const METHOD_SUBMIT_REBALANCE: &str = "rebalancer_submitRebalance";
pub const METHOD_GET_VOLATILITY: &str = "rebalancer_getVolatility";

/// A `ChainClient` speaking JSON-RPC 2.0 to a node that fronts the
/// rebalancing contract.
pub struct RpcChainClient {
    client: reqwest::Client,
    rpc_url: String,
    contract_address: String,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ChainError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            contract_address: config.contract_address.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<T, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::trace!(method, id = request.id, "Sending JSON-RPC request.");
        let response = self.client.post(&self.rpc_url).json(&request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChainError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: JsonRpcResponse<T> = serde_json::from_str(&text).map_err(|e| {
            ChainError::Deserialization(format!("{}. Original text: {}", e, text))
        })?;
        envelope.into_result()
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_snapshot(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSnapshot, ChainError> {
        let raw: SnapshotResponse = self
            .call(
                METHOD_GET_SNAPSHOT,
                json!([self.contract_address, portfolio_id.as_str()]),
            )
            .await?;
        PortfolioSnapshot::try_from(raw)
    }

    async fn submit_rebalance(&self, request: &RebalanceRequest) -> Result<TxReceipt, ChainError> {
        let params = json!([
            self.contract_address,
            {
                "portfolioId": request.portfolio_id.as_str(),
                "weights": request.weights,
                "shorts": request.shorts,
                "riskTolerance": request.risk_tolerance,
            }
        ]);
        let raw: SubmitResponse = self.call(METHOD_SUBMIT_REBALANCE, params).await?;
        let receipt = TxReceipt::from(raw);
        tracing::debug!(
            portfolio_id = %request.portfolio_id,
            success = receipt.success,
            tx_hash = ?receipt.tx_hash,
            "Rebalance submission answered."
        );
        Ok(receipt)
    }
}

#[async_trait]
impl MarketConditions for RpcChainClient {
    /// Readings outside `[0, 1]` are clamped.
    async fn volatility(&self) -> Result<Decimal, ChainError> {
        let raw: Decimal = self.call(METHOD_GET_VOLATILITY, json!([])).await?;
        let clamped = raw.clamp(Decimal::ZERO, Decimal::ONE);
        if clamped != raw {
            tracing::debug!(%raw, %clamped, "Volatility reading clamped.");
        }
        Ok(clamped)
    }
}
