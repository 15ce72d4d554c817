use crate::error::{classify_message, ChainError};
use core_types::{AssetHolding, ErrorKind, PortfolioSnapshot, TxReceipt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Using `#[serde(rename_all = "camelCase")]` to map the node's camelCase JSON onto Rust snake_case.

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

/// A JSON-RPC 2.0 response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

impl<T> JsonRpcResponse<T> {
    pub fn into_result(self) -> Result<T, ChainError> {
        if let Some(error) = self.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or_else(|| {
            ChainError::Deserialization("response carried neither result nor error".to_string())
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// The result of `rebalancer_getSnapshot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub total_value: Decimal,
    pub assets: BTreeMap<String, AssetEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AssetEntry {
    pub weight: Decimal,
    pub value: Decimal,
}

impl TryFrom<SnapshotResponse> for PortfolioSnapshot {
    type Error = ChainError;

    fn try_from(raw: SnapshotResponse) -> Result<Self, Self::Error> {
        if raw.total_value.is_sign_negative() {
            return Err(ChainError::InvalidData(format!(
                "negative total value {}",
                raw.total_value
            )));
        }
        let assets = raw
            .assets
            .into_iter()
            .map(|(symbol, entry)| {
                if entry.weight.is_sign_negative() {
                    return Err(ChainError::InvalidData(format!(
                        "negative weight {} for {}",
                        entry.weight, symbol
                    )));
                }
                Ok((symbol, AssetHolding { weight: entry.weight, value: entry.value }))
            })
            .collect::<Result<BTreeMap<_, _>, ChainError>>()?;

        Ok(PortfolioSnapshot {
            total_value: raw.total_value,
            assets,
        })
    }
}

/// The result of `rebalancer_submitRebalance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<SubmitResponse> for TxReceipt {
    fn from(raw: SubmitResponse) -> Self {
        let error_kind = if raw.success {
            None
        } else {
            Some(raw.error.as_deref().map(classify_message).unwrap_or(ErrorKind::Rejected))
        };
        TxReceipt {
            success: raw.success,
            tx_hash: raw.tx_hash,
            error_kind,
            message: raw.error,
        }
    }
}
