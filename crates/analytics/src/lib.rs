//! # Rebalancer Analytics
//!
//! Keeps the history of attempted rebalances and turns it into the figures an
//! operator looks at: success rate over a window, counts by urgency, lifetime
//! totals, recent errors and the names of unhealthy operations.
//!
//! ## Public API
//!
//! - `MetricsRecorder`: The append-only, bounded history plus counters.
//! - `MetricsReport`: The periodic summary, printable via `Display`.
//! - `ErrorLogEntry`, `MetricsCounters`: The error log and lifetime totals.

// Declare the modules that constitute this crate.
pub mod recorder;
pub mod report;

// Re-export the key components to create a clean, public-facing API.
pub use recorder::{ErrorLogEntry, MetricsCounters, MetricsRecorder};
pub use report::MetricsReport;
