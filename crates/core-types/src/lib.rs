//! # Rebalancer Core Types
//!
//! Layer 0 of the workspace. Every other crate speaks in these types: portfolio
//! identifiers and snapshots, the opportunities derived from them, the records
//! the metrics recorder keeps, and the error taxonomy the resilient executor
//! classifies failures with.
//!
//! The crate also owns the injected [`Clock`], so schedules, breaker cooldowns and
//! record timestamps can all be driven by a [`ManualClock`] in tests.

pub mod clock;
pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use clock::{Clock, ManualClock, SystemClock};
pub use enums::{ErrorKind, RiskTolerance, Urgency};
pub use error::CoreError;
pub use structs::{
    AssetHolding, EstimatedImpact, ExecutionResult, PortfolioId, PortfolioSnapshot,
    RebalanceOpportunity, RebalanceRecord, RebalanceRequest, TxReceipt,
};
