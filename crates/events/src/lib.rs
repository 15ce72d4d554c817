//! # Rebalancer Events
//!
//! The outbound event contract of the scheduler. Observability collaborators
//! (the alerter, a dashboard bridge, tests) subscribe to a broadcast channel of
//! [`SchedulerEvent`]s instead of hooking into the scheduler's internals.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{EventBus, GateSkip, LogLevel, LogMessage, SchedulerEvent};
