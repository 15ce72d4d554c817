use core_types::{ErrorKind, TxReceipt};
use executor::Classify;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Failed to build the HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP transport failed ({kind}): {message}")]
    Transport { kind: ErrorKind, message: String },

    #[error("The RPC endpoint answered HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("The RPC call returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to deserialize the RPC response: {0}")]
    Deserialization(String),

    #[error("Invalid data from chain: {0}")]
    InvalidData(String),

    #[error("Rebalance transaction failed ({kind}): {message}")]
    Transaction { kind: ErrorKind, message: String },
}

impl ChainError {
    /// Turns an unsuccessful receipt into an error so the executor can decide
    /// whether to retry it. Successful receipts pass through.
    pub fn check_receipt(receipt: TxReceipt) -> Result<TxReceipt, ChainError> {
        if receipt.success {
            return Ok(receipt);
        }
        let message = receipt
            .message
            .unwrap_or_else(|| "transaction reported failure".to_string());
        let kind = receipt
            .error_kind
            .unwrap_or_else(|| classify_message(&message));
        Err(ChainError::Transaction { kind, message })
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if let Some(status) = err.status() {
            classify_status(status)
        } else if err.is_decode() || err.is_builder() {
            ErrorKind::InvalidInput
        } else {
            ErrorKind::Network
        };
        ChainError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

impl Classify for ChainError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChainError::ClientBuild(_) => ErrorKind::InvalidInput,
            ChainError::Transport { kind, .. } | ChainError::Transaction { kind, .. } => *kind,
            ChainError::Http { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(ErrorKind::Network),
            ChainError::Rpc { message, .. } => classify_message(message),
            ChainError::Deserialization(_) | ChainError::InvalidData(_) => ErrorKind::InvalidInput,
        }
    }
}

pub(crate) fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        s if s.is_server_error() => ErrorKind::Network,
        _ => ErrorKind::InvalidInput,
    }
}

/// Sorts a node or contract error message into the taxonomy. Messages that
/// match nothing are treated as transient node trouble.
pub(crate) fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_ascii_lowercase();
    let has = |needle: &str| message.contains(needle);

    if has("nonce") || has("underpriced") {
        ErrorKind::NonceConflict
    } else if has("revert") || has("rejected") {
        ErrorKind::Rejected
    } else if has("gas") {
        ErrorKind::GasEstimation
    } else if has("unauthorized") || has("forbidden") {
        ErrorKind::Unauthorized
    } else if has("rate limit") || has("too many requests") {
        ErrorKind::RateLimited
    } else if has("timeout") || has("timed out") {
        ErrorKind::Timeout
    } else if has("invalid") {
        ErrorKind::InvalidInput
    } else {
        ErrorKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_messages_map_onto_the_taxonomy() {
        assert_eq!(classify_message("nonce too low"), ErrorKind::NonceConflict);
        assert_eq!(classify_message("replacement transaction underpriced"), ErrorKind::NonceConflict);
        assert_eq!(classify_message("gas required exceeds allowance"), ErrorKind::GasEstimation);
        assert_eq!(classify_message("execution reverted: weights"), ErrorKind::Rejected);
        assert_eq!(classify_message("Request REJECTED by contract"), ErrorKind::Rejected);
        assert_eq!(classify_message("invalid params"), ErrorKind::InvalidInput);
        assert_eq!(classify_message("header not found"), ErrorKind::Network);
    }

    #[test]
    fn http_statuses_map_onto_the_taxonomy() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorKind::RateLimited);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::Unauthorized);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorKind::Unauthorized);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorKind::Network);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ErrorKind::InvalidInput);

        let err = ChainError::Http { status: 429, body: String::new() };
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn failed_receipts_become_classified_errors() {
        let ok = TxReceipt {
            success: true,
            tx_hash: Some("0x1".to_string()),
            error_kind: None,
            message: None,
        };
        assert!(ChainError::check_receipt(ok).is_ok());

        let explicit = TxReceipt {
            success: false,
            tx_hash: None,
            error_kind: Some(ErrorKind::Unauthorized),
            message: None,
        };
        assert_eq!(ChainError::check_receipt(explicit).unwrap_err().kind(), ErrorKind::Unauthorized);

        let inferred = TxReceipt {
            success: false,
            tx_hash: None,
            error_kind: None,
            message: Some("nonce already used".to_string()),
        };
        let err = ChainError::check_receipt(inferred).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceConflict);
        assert!(err.to_string().contains("nonce already used"));
    }
}
