use crate::report::MetricsReport;
use chrono::{DateTime, Utc};
use configuration::MetricsConfig;
use core_types::{Clock, ErrorKind, PortfolioId, RebalanceRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How many error log entries a report carries.
const REPORT_ERROR_TAIL: usize = 10;

/// One failure worth showing an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub portfolio_id: Option<PortfolioId>,
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Lifetime counters. Unaffected by history pruning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Successful submissions that produced a transaction hash.
    pub transactions: u64,
    pub gate_skips: u64,
    pub fetch_failures: u64,
}

#[derive(Debug, Default)]
struct History {
    records: VecDeque<RebalanceRecord>,
    errors: VecDeque<ErrorLogEntry>,
    counters: MetricsCounters,
}

/// Append-only history of attempted rebalances plus aggregate counters.
///
/// Records are never edited. The oldest ones are pruned once the history
/// exceeds `max_records` or falls outside `retention`.
pub struct MetricsRecorder {
    max_records: usize,
    retention: Option<Duration>,
    max_error_log: usize,
    clock: Arc<dyn Clock>,
    history: Mutex<History>,
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_records: config.max_records.max(1),
            retention: config.retention_ms.map(Duration::from_millis),
            max_error_log: config.max_error_log,
            clock,
            history: Mutex::new(History::default()),
        }
    }

    pub async fn record(&self, record: RebalanceRecord) {
        let mut history = self.history.lock().await;

        history.counters.attempts += 1;
        if record.success {
            history.counters.successes += 1;
            if record.result.tx_hash.is_some() {
                history.counters.transactions += 1;
            }
        } else {
            history.counters.failures += 1;
        }

        tracing::debug!(
            record_id = %record.record_id,
            portfolio_id = %record.portfolio_id,
            success = record.success,
            "Rebalance recorded."
        );
        history.records.push_back(record);

        while history.records.len() > self.max_records {
            history.records.pop_front();
        }
        if let Some(cutoff) = self.retention.and_then(|r| self.cutoff(r)) {
            while history.records.front().is_some_and(|r| r.timestamp < cutoff) {
                history.records.pop_front();
            }
        }
    }

    pub async fn record_gate_skip(&self) {
        self.history.lock().await.counters.gate_skips += 1;
    }

    /// Appends to the bounded error log.
    pub async fn record_error(&self, entry: ErrorLogEntry) {
        let mut history = self.history.lock().await;
        if self.max_error_log == 0 {
            return;
        }
        history.errors.push_back(entry);
        while history.errors.len() > self.max_error_log {
            history.errors.pop_front();
        }
    }

    /// Counts a failed snapshot read and logs it.
    pub async fn record_fetch_failure(&self, entry: ErrorLogEntry) {
        self.history.lock().await.counters.fetch_failures += 1;
        self.record_error(entry).await;
    }

    /// Records whose timestamp falls within the last `window`, oldest first.
    pub async fn recent_since(&self, window: Duration) -> Vec<RebalanceRecord> {
        let cutoff = self.cutoff(window);
        let history = self.history.lock().await;
        history
            .records
            .iter()
            .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
            .cloned()
            .collect()
    }

    /// Fraction of successful records within `window`; zero for an empty window.
    pub async fn success_rate(&self, window: Duration) -> Decimal {
        let recent = self.recent_since(window).await;
        ratio(recent.iter().filter(|r| r.success).count(), recent.len())
    }

    pub async fn counters(&self) -> MetricsCounters {
        self.history.lock().await.counters
    }

    /// Lifetime count of recorded rebalance attempts.
    pub async fn total_rebalances(&self) -> u64 {
        self.history.lock().await.counters.attempts
    }

    pub async fn errors(&self) -> Vec<ErrorLogEntry> {
        self.history.lock().await.errors.iter().cloned().collect()
    }

    pub async fn report(&self, window: Duration, unhealthy_operations: Vec<String>) -> MetricsReport {
        let recent = self.recent_since(window).await;
        let (totals, recent_errors) = {
            let history = self.history.lock().await;
            let skip = history.errors.len().saturating_sub(REPORT_ERROR_TAIL);
            (history.counters, history.errors.iter().skip(skip).cloned().collect())
        };

        let successes = recent.iter().filter(|r| r.success).count();
        let mut by_urgency = BTreeMap::new();
        for record in &recent {
            *by_urgency.entry(record.urgency).or_insert(0) += 1;
        }
        let average_duration_ms = if recent.is_empty() {
            None
        } else {
            let total: u64 = recent.iter().map(|r| r.result.duration_ms).sum();
            Some(total / recent.len() as u64)
        };

        MetricsReport {
            generated_at: self.clock.wall_time(),
            window_ms: window.as_millis() as u64,
            attempts: recent.len(),
            successes,
            failures: recent.len() - successes,
            success_rate: ratio(successes, recent.len()),
            by_urgency,
            average_duration_ms,
            totals,
            recent_errors,
            unhealthy_operations,
        }
    }

    /// The earliest timestamp inside `window`. None means the window reaches
    /// further back than the calendar can express, i.e. everything is inside.
    fn cutoff(&self, window: Duration) -> Option<DateTime<Utc>> {
        let window = chrono::Duration::from_std(window).ok()?;
        self.clock.wall_time().checked_sub_signed(window)
    }
}

fn ratio(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part as u64) / Decimal::from(whole as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{
        EstimatedImpact, ExecutionResult, ManualClock, RebalanceOpportunity, Urgency,
    };
    use rust_decimal_macros::dec;

    fn recorder(config: MetricsConfig) -> (MetricsRecorder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MetricsRecorder::new(&config, clock.clone()), clock)
    }

    fn record(clock: &ManualClock, urgency: Urgency, result: ExecutionResult) -> RebalanceRecord {
        let opportunity = RebalanceOpportunity {
            portfolio_id: "alpha".into(),
            deviations: BTreeMap::new(),
            max_deviation: dec!(0.15),
            urgency,
            estimated_impact: EstimatedImpact::default(),
        };
        RebalanceRecord::new(clock.wall_time(), &opportunity, result)
    }

    fn error(clock: &ManualClock, message: &str) -> ErrorLogEntry {
        ErrorLogEntry {
            timestamp: clock.wall_time(),
            portfolio_id: Some("alpha".into()),
            operation: "get_snapshot".to_string(),
            kind: ErrorKind::Network,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_window_has_zero_success_rate() {
        let (recorder, _) = recorder(MetricsConfig::default());
        assert_eq!(recorder.success_rate(Duration::from_secs(3600)).await, Decimal::ZERO);
        assert!(recorder.recent_since(Duration::from_secs(3600)).await.is_empty());
    }

    #[tokio::test]
    async fn success_rate_only_counts_the_window() {
        let (recorder, clock) = recorder(MetricsConfig::default());

        recorder
            .record(record(&clock, Urgency::Low, ExecutionResult::failed(10, ErrorKind::Rejected, "no")))
            .await;
        clock.advance(Duration::from_secs(7200));
        recorder
            .record(record(&clock, Urgency::High, ExecutionResult::succeeded(20, Some("0x1".into()))))
            .await;
        recorder
            .record(record(&clock, Urgency::High, ExecutionResult::failed(30, ErrorKind::Timeout, "slow")))
            .await;

        let hour = Duration::from_secs(3600);
        assert_eq!(recorder.recent_since(hour).await.len(), 2);
        assert_eq!(recorder.success_rate(hour).await, dec!(0.5));
        assert_eq!(recorder.recent_since(Duration::from_secs(86_400)).await.len(), 3);

        let counters = recorder.counters().await;
        assert_eq!(counters.attempts, 3);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failures, 2);
        assert_eq!(counters.transactions, 1);
        assert_eq!(recorder.total_rebalances().await, 3);
    }

    #[tokio::test]
    async fn history_is_pruned_by_count_and_age() {
        let (recorder, clock) = recorder(MetricsConfig {
            max_records: 2,
            retention_ms: Some(60_000),
            ..MetricsConfig::default()
        });

        for _ in 0..3 {
            recorder
                .record(record(&clock, Urgency::Medium, ExecutionResult::succeeded(5, None)))
                .await;
        }
        assert_eq!(recorder.recent_since(Duration::from_secs(3600)).await.len(), 2);

        clock.advance(Duration::from_secs(120));
        recorder
            .record(record(&clock, Urgency::Medium, ExecutionResult::succeeded(5, None)))
            .await;

        let kept = recorder.recent_since(Duration::from_secs(3600)).await;
        assert_eq!(kept.len(), 1);
        // Pruning never touches the lifetime counters.
        assert_eq!(recorder.counters().await.attempts, 4);
    }

    #[tokio::test]
    async fn error_log_is_bounded() {
        let (recorder, clock) = recorder(MetricsConfig {
            max_error_log: 2,
            ..MetricsConfig::default()
        });

        recorder.record_fetch_failure(error(&clock, "first")).await;
        recorder.record_error(error(&clock, "second")).await;
        recorder.record_error(error(&clock, "third")).await;

        let messages: Vec<String> = recorder.errors().await.into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["second", "third"]);
        assert_eq!(recorder.counters().await.fetch_failures, 1);
    }

    #[tokio::test]
    async fn report_summarises_the_window() {
        let (recorder, clock) = recorder(MetricsConfig::default());
        recorder
            .record(record(&clock, Urgency::High, ExecutionResult::succeeded(100, Some("0xa".into()))))
            .await;
        recorder
            .record(record(&clock, Urgency::Low, ExecutionResult::failed(300, ErrorKind::Network, "down")))
            .await;
        recorder.record_gate_skip().await;
        recorder.record_error(error(&clock, "node unreachable")).await;

        let report = recorder
            .report(Duration::from_secs(6 * 3600), vec!["submit_rebalance".to_string()])
            .await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.success_rate_pct(), dec!(50));
        assert_eq!(report.by_urgency.get(&Urgency::High), Some(&1));
        assert_eq!(report.average_duration_ms, Some(200));
        assert_eq!(report.totals.gate_skips, 1);
        assert!(!report.is_healthy());

        let text = report.to_string();
        assert!(text.contains("last 6h"), "{text}");
        assert!(text.contains("success rate 50"), "{text}");
        assert!(text.contains("Unhealthy operations: submit_rebalance"), "{text}");
        assert!(text.contains("node unreachable"), "{text}");
    }
}
