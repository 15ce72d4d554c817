use crate::error::EventsError;
use analytics::MetricsReport;
use chrono::{DateTime, Utc};
use core_types::{EstimatedImpact, ErrorKind, PortfolioId, RebalanceRecord, Urgency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A structured log message for observers that are not reading the tracing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// An opportunity that was found but refused by the cost-benefit gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSkip {
    pub portfolio_id: PortfolioId,
    pub max_deviation: Decimal,
    pub urgency: Urgency,
    pub impact: EstimatedImpact,
}

/// Everything the scheduler tells the outside world.
///
/// Serialized as `{"type": "...", "payload": {...}}` so that a JSON consumer can
/// dispatch on `type` without knowing every payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SchedulerEvent {
    /// The scan and reporting loops have started.
    Started,
    /// The loops have been cancelled. In-flight executions may still finish.
    Stopped,
    /// A rebalance was submitted and confirmed.
    RebalanceCompleted(RebalanceRecord),
    /// A rebalance attempt failed after the executor gave up.
    RebalanceFailed(RebalanceRecord),
    /// A drift opportunity was not worth its cost.
    GateSkipped(GateSkip),
    /// The portfolio snapshot could not be fetched.
    SnapshotFailed {
        portfolio_id: PortfolioId,
        kind: ErrorKind,
        message: String,
    },
    /// The periodic metrics report.
    Report(MetricsReport),
    /// A free-form structured log line.
    Log(LogMessage),
}

impl SchedulerEvent {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The sending half of the event channel, shared by everything that emits.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers; event dropped.");
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(SchedulerEvent::Log(LogMessage {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
