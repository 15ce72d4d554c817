use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse severity of a portfolio's drift. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Returns `self` raised to at least `floor`.
    pub fn at_least(self, floor: Urgency) -> Self {
        self.max(floor)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Medium => write!(f, "medium"),
            Urgency::High => write!(f, "high"),
        }
    }
}

/// How much execution risk the portfolio owner accepts. Forwarded to the chain
/// client with every rebalance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

/// The failure taxonomy shared by every outbound call.
///
/// The first five kinds are transient and consume a retry attempt. The next
/// three are fatal and abort immediately. `CircuitOpen` is raised by the
/// executor itself and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimited,
    NonceConflict,
    GasEstimation,
    InvalidInput,
    Unauthorized,
    Rejected,
    CircuitOpen,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::NonceConflict
                | ErrorKind::GasEstimation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NonceConflict => "nonce_conflict",
            ErrorKind::GasEstimation => "gas_estimation",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Rejected => "rejected",
            ErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorKind {}

impl FromStr for ErrorKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(ErrorKind::Network),
            "timeout" => Ok(ErrorKind::Timeout),
            "rate_limited" => Ok(ErrorKind::RateLimited),
            "nonce_conflict" => Ok(ErrorKind::NonceConflict),
            "gas_estimation" => Ok(ErrorKind::GasEstimation),
            "invalid_input" => Ok(ErrorKind::InvalidInput),
            "unauthorized" => Ok(ErrorKind::Unauthorized),
            "rejected" => Ok(ErrorKind::Rejected),
            "circuit_open" => Ok(ErrorKind::CircuitOpen),
            other => Err(CoreError::UnknownErrorKind(other.to_string())),
        }
    }
}
