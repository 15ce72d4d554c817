use crate::recorder::{ErrorLogEntry, MetricsCounters};
use chrono::{DateTime, Utc};
use core_types::Urgency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A periodic summary of rebalancing activity.
///
/// This struct is produced by `MetricsRecorder::report` and is the data
/// transfer object carried by the scheduler's report event and the alerter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub window_ms: u64,

    // I. Window activity
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: Decimal,
    pub by_urgency: BTreeMap<Urgency, usize>,
    pub average_duration_ms: Option<u64>, // None when the window is empty

    // II. Lifetime counters
    pub totals: MetricsCounters,

    // III. Health
    pub recent_errors: Vec<ErrorLogEntry>,
    pub unhealthy_operations: Vec<String>,
}

impl MetricsReport {
    /// Success rate as a percentage rounded to two places.
    pub fn success_rate_pct(&self) -> Decimal {
        (self.success_rate * Decimal::ONE_HUNDRED).round_dp(2)
    }

    pub fn is_healthy(&self) -> bool {
        self.unhealthy_operations.is_empty()
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = Decimal::from(self.window_ms) / Decimal::from(3_600_000u64);
        writeln!(
            f,
            "Rebalancing report ({}, last {}h)",
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            hours.round_dp(1).normalize()
        )?;
        writeln!(
            f,
            "  Attempts: {} ({} ok, {} failed), success rate {}%",
            self.attempts,
            self.successes,
            self.failures,
            self.success_rate_pct()
        )?;

        if !self.by_urgency.is_empty() {
            let parts: Vec<String> = self
                .by_urgency
                .iter()
                .rev()
                .map(|(urgency, count)| format!("{urgency}: {count}"))
                .collect();
            writeln!(f, "  By urgency: {}", parts.join(", "))?;
        }
        if let Some(avg) = self.average_duration_ms {
            writeln!(f, "  Average execution time: {avg}ms")?;
        }

        writeln!(
            f,
            "  Lifetime: {} attempts, {} transactions, {} gate skips, {} fetch failures",
            self.totals.attempts,
            self.totals.transactions,
            self.totals.gate_skips,
            self.totals.fetch_failures
        )?;

        if self.unhealthy_operations.is_empty() {
            write!(f, "  All circuit breakers closed")?;
        } else {
            write!(f, "  Unhealthy operations: {}", self.unhealthy_operations.join(", "))?;
        }

        for entry in &self.recent_errors {
            write!(
                f,
                "\n  [{}] {} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.operation,
                entry.kind,
                entry.message
            )?;
        }
        Ok(())
    }
}
