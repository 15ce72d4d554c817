//! # Rebalancer Engine
//!
//! The orchestrator. `RebalancingScheduler` owns the registry of managed
//! portfolios and, on every scan tick, runs each due portfolio through the
//! pipeline:
//!
//! snapshot (resilient) → drift evaluation → cost-benefit gate →
//! rebalance submission (resilient) → metrics record → reschedule.
//!
//! A second, slower loop publishes periodic metrics reports. Outcomes are
//! broadcast as `SchedulerEvent`s for the alerter and any other observer.

pub mod error;
pub mod registry;
pub mod scheduler;
pub mod status;

pub use error::EngineError;
pub use registry::PortfolioSchedule;
pub use scheduler::{Evaluation, RebalancingScheduler, VOLATILITY_OPERATION};
pub use status::{PortfolioOutcome, SchedulerStatus, TickSummary};
