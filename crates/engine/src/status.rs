use core_types::ErrorKind;
use serde::{Deserialize, Serialize};

/// Read-only view of the scheduler for operators and dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub active_portfolio_count: usize,
    /// Lifetime count of recorded rebalance attempts.
    pub total_rebalances: u64,
    /// Rebalance attempts recorded within the status window.
    pub recent_rebalances: usize,
    pub window_ms: u64,
}

/// What happened to one portfolio during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortfolioOutcome {
    /// Drift stayed at or under the portfolio's threshold.
    WithinTolerance,
    /// Drift was found but did not justify its cost.
    GateSkipped,
    Rebalanced,
    RebalanceFailed(ErrorKind),
    SnapshotFailed(ErrorKind),
}

/// Tally of one tick across every portfolio that was due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub within_tolerance: usize,
    pub gate_skipped: usize,
    pub rebalanced: usize,
    pub failed: usize,
    pub snapshot_failures: usize,
}

impl TickSummary {
    pub fn tally(outcomes: &[PortfolioOutcome]) -> Self {
        let mut summary = Self {
            evaluated: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                PortfolioOutcome::WithinTolerance => summary.within_tolerance += 1,
                PortfolioOutcome::GateSkipped => summary.gate_skipped += 1,
                PortfolioOutcome::Rebalanced => summary.rebalanced += 1,
                PortfolioOutcome::RebalanceFailed(_) => summary.failed += 1,
                PortfolioOutcome::SnapshotFailed(_) => summary.snapshot_failures += 1,
            }
        }
        summary
    }
}
