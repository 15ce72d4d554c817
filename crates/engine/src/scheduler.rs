use crate::error::EngineError;
use crate::registry::{PortfolioSchedule, Registry};
use crate::status::{PortfolioOutcome, SchedulerStatus, TickSummary};
use analytics::{ErrorLogEntry, MetricsRecorder, MetricsReport};
use chain_client::{ChainClient, ChainError, MarketConditions};
use configuration::{Config, PortfolioConfig, SchedulerConfig};
use core_types::{
    Clock, ErrorKind, ExecutionResult, PortfolioId, PortfolioSnapshot, RebalanceOpportunity,
    RebalanceRecord, RebalanceRequest,
};
use events::{EventBus, GateSkip, LogLevel, SchedulerEvent};
use executor::{ExecutorError, ResilientExecutor};
use futures::stream::{self, StreamExt};
use policy::{CostBenefitGate, DriftEvaluator};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Operation name the volatility reading is protected under.
pub const VOLATILITY_OPERATION: &str = "get_volatility";

/// Result of a dry-run evaluation: what a tick would decide, without executing.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub portfolio_id: PortfolioId,
    pub snapshot: PortfolioSnapshot,
    pub volatility: Decimal,
    pub opportunity: Option<RebalanceOpportunity>,
    pub would_execute: bool,
}

struct RunningLoops {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// The fleet rebalancing scheduler.
///
/// Owns the registry of portfolio schedules and drives two loops: a scan loop
/// that evaluates every due portfolio and executes justified rebalances, and a
/// slower reporting loop that publishes a `MetricsReport`.
pub struct RebalancingScheduler {
    settings: SchedulerConfig,
    registry: Registry,
    chain: Arc<dyn ChainClient>,
    market: Option<Arc<dyn MarketConditions>>,
    executor: Arc<ResilientExecutor>,
    recorder: Arc<MetricsRecorder>,
    evaluator: DriftEvaluator,
    gate: CostBenefitGate,
    clock: Arc<dyn Clock>,
    events: EventBus,
    running: Mutex<Option<RunningLoops>>,
}

impl RebalancingScheduler {
    /// Builds a scheduler and its collaborators from configuration. Portfolios
    /// are not registered here; call `add_portfolio` for each.
    pub fn new(
        config: &Config,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            settings: config.scheduler.clone(),
            registry: Registry::default(),
            chain,
            market: None,
            executor: Arc::new(ResilientExecutor::new(&config.resilience, Arc::clone(&clock))),
            recorder: Arc::new(MetricsRecorder::new(&config.metrics, Arc::clone(&clock))),
            evaluator: DriftEvaluator::from_config(&config.drift, &config.cost_benefit)?,
            gate: CostBenefitGate::from_config(&config.cost_benefit)?,
            clock,
            events: EventBus::default(),
            running: Mutex::new(None),
        })
    }

    pub fn with_market(mut self, market: Arc<dyn MarketConditions>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Registry ---

    /// Registers a portfolio. It becomes due on the next tick.
    pub async fn add_portfolio(&self, config: PortfolioConfig) -> Result<(), EngineError> {
        config.validate()?;
        let id = config.id.clone();
        if !self.registry.insert(PortfolioSchedule::new(config, self.clock.now())).await {
            return Err(EngineError::PortfolioExists(id));
        }
        info!(portfolio_id = %id, "Portfolio registered.");
        Ok(())
    }

    /// Unregisters a portfolio. An attempt already in flight finishes but no
    /// longer touches the schedule.
    pub async fn remove_portfolio(&self, id: &PortfolioId) -> bool {
        let removed = self.registry.remove(id).await.is_some();
        if removed {
            info!(portfolio_id = %id, "Portfolio removed.");
        }
        removed
    }

    /// Replaces a portfolio's configuration, keeping its schedule.
    pub async fn reconfigure(&self, config: PortfolioConfig) -> Result<(), EngineError> {
        config.validate()?;
        let id = config.id.clone();
        if !self.registry.replace_config(config).await {
            return Err(EngineError::PortfolioNotFound(id));
        }
        info!(portfolio_id = %id, "Portfolio reconfigured.");
        Ok(())
    }

    pub async fn schedule(&self, id: &PortfolioId) -> Option<PortfolioSchedule> {
        self.registry.get(id).await
    }

    pub async fn portfolio_ids(&self) -> Vec<PortfolioId> {
        self.registry.ids().await
    }

    // --- Lifecycle ---

    /// Starts the scan and reporting loops. Returns false, doing nothing, if
    /// they are already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Scheduler already running; start ignored.");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scan = {
            let this = Arc::clone(self);
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { this.scan_loop(rx).await })
        };
        let report = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.report_loop(shutdown_rx).await })
        };
        *running = Some(RunningLoops {
            shutdown,
            handles: vec![scan, report],
        });

        info!(
            scan_interval_ms = self.settings.scan_interval_ms,
            report_interval_ms = self.settings.report_interval_ms,
            "Rebalancing scheduler started."
        );
        self.events.emit(SchedulerEvent::Started);
        true
    }

    /// Stops both loops and waits for a tick already in progress to finish.
    /// In-flight executions are not interrupted. Returns false if the scheduler
    /// was not running.
    pub async fn stop(&self) -> bool {
        let Some(loops) = self.running.lock().await.take() else {
            return false;
        };

        let _ = loops.shutdown.send(true);
        for handle in loops.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop ended abnormally.");
            }
        }

        info!("Rebalancing scheduler stopped.");
        self.events.emit(SchedulerEvent::Stopped);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn scan_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.settings.scan_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = timer.tick() => {
                    let summary = self.run_tick().await;
                    if summary.evaluated > 0 {
                        info!(?summary, "Scan tick complete.");
                    }
                }
            }
        }
        debug!("Scan loop exited.");
    }

    async fn report_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.settings.report_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; reports cover a full period.
        timer.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = timer.tick() => {
                    let report = self.report().await;
                    info!("{}", report);
                    self.events.emit(SchedulerEvent::Report(report));
                }
            }
        }
        debug!("Report loop exited.");
    }

    // --- Ticks ---

    /// Evaluates every due portfolio once, concurrently up to the configured
    /// limit. A failing portfolio never affects the others. Portfolios already
    /// claimed by an overlapping tick are skipped.
    pub async fn run_tick(self: &Arc<Self>) -> TickSummary {
        let due = self.registry.claim_due(self.clock.now()).await;
        if due.is_empty() {
            return TickSummary::default();
        }

        let volatility = self.volatility().await;
        let limit = self.settings.max_concurrency.unwrap_or(due.len()).max(1);
        debug!(due = due.len(), limit, %volatility, "Starting scan tick.");

        let outcomes: Vec<PortfolioOutcome> = stream::iter(due)
            .map(|config| {
                let this = Arc::clone(self);
                async move {
                    let id = config.id.clone();
                    let outcome = this.process_portfolio(config, volatility).await;
                    this.registry.release(&id).await;
                    outcome
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        TickSummary::tally(&outcomes)
    }

    /// Snapshot, drift and gate for one portfolio without executing anything.
    pub async fn evaluate_portfolio(&self, id: &PortfolioId) -> Result<Evaluation, EngineError> {
        let schedule = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| EngineError::PortfolioNotFound(id.clone()))?;
        let config = schedule.config;

        let snapshot = self.fetch_snapshot(id).await?;
        let volatility = self.volatility().await;
        let opportunity = self.evaluator.evaluate(
            id,
            &snapshot,
            &config.target_allocation,
            config.min_deviation_threshold,
            volatility,
        );
        let would_execute = opportunity
            .as_ref()
            .is_some_and(|o| self.gate.should_execute(o));

        Ok(Evaluation {
            portfolio_id: id.clone(),
            snapshot,
            volatility,
            opportunity,
            would_execute,
        })
    }

    async fn process_portfolio(&self, config: PortfolioConfig, volatility: Decimal) -> PortfolioOutcome {
        let id = &config.id;

        let snapshot = match self.fetch_snapshot(id).await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.on_snapshot_failure(id, err).await,
        };

        let Some(opportunity) = self.evaluator.evaluate(
            id,
            &snapshot,
            &config.target_allocation,
            config.min_deviation_threshold,
            volatility,
        ) else {
            debug!(portfolio_id = %id, "Portfolio within tolerance.");
            return PortfolioOutcome::WithinTolerance;
        };

        if !self.gate.should_execute(&opportunity) {
            info!(
                portfolio_id = %id,
                max_deviation = %opportunity.max_deviation,
                urgency = %opportunity.urgency,
                estimated_cost = %opportunity.estimated_impact.estimated_cost,
                expected_improvement = %opportunity.estimated_impact.expected_improvement,
                "Rebalance skipped: cost exceeds benefit."
            );
            self.recorder.record_gate_skip().await;
            self.events.emit(SchedulerEvent::GateSkipped(GateSkip {
                portfolio_id: id.clone(),
                max_deviation: opportunity.max_deviation,
                urgency: opportunity.urgency,
                impact: opportunity.estimated_impact,
            }));
            return PortfolioOutcome::GateSkipped;
        }

        let request = RebalanceRequest {
            portfolio_id: id.clone(),
            weights: config.target_allocation.clone(),
            shorts: config.target_shorts.clone(),
            risk_tolerance: config.risk_tolerance,
        };
        self.execute_rebalance(&opportunity, &request).await
    }

    async fn execute_rebalance(
        &self,
        opportunity: &RebalanceOpportunity,
        request: &RebalanceRequest,
    ) -> PortfolioOutcome {
        let id = &request.portfolio_id;
        info!(
            portfolio_id = %id,
            max_deviation = %opportunity.max_deviation,
            urgency = %opportunity.urgency,
            "Executing rebalance."
        );

        let chain: &dyn ChainClient = self.chain.as_ref();
        let started = self.clock.now();
        let result = self
            .executor
            .execute(&self.settings.rebalance_operation, move || async move {
                ChainError::check_receipt(chain.submit_rebalance(request).await?)
            })
            .await;
        let finished = self.clock.now();
        let duration_ms = finished.saturating_duration_since(started).as_millis() as u64;

        let (execution, outcome) = match result {
            Ok(receipt) => {
                info!(portfolio_id = %id, tx_hash = ?receipt.tx_hash, duration_ms, "Rebalance confirmed.");
                (
                    ExecutionResult::succeeded(duration_ms, receipt.tx_hash),
                    PortfolioOutcome::Rebalanced,
                )
            }
            Err(err) => {
                let kind = err.kind();
                warn!(portfolio_id = %id, %kind, error = %err, "Rebalance failed.");
                self.recorder
                    .record_error(ErrorLogEntry {
                        timestamp: self.clock.wall_time(),
                        portfolio_id: Some(id.clone()),
                        operation: self.settings.rebalance_operation.clone(),
                        kind,
                        message: err.to_string(),
                    })
                    .await;
                (
                    ExecutionResult::failed(duration_ms, kind, err.to_string()),
                    PortfolioOutcome::RebalanceFailed(kind),
                )
            }
        };

        let success = execution.success;
        let record = RebalanceRecord::new(self.clock.wall_time(), opportunity, execution);
        self.recorder.record(record.clone()).await;
        self.registry.mark_attempted(id, finished, success).await;

        self.events.emit(if success {
            SchedulerEvent::RebalanceCompleted(record)
        } else {
            SchedulerEvent::RebalanceFailed(record)
        });
        outcome
    }

    async fn fetch_snapshot(&self, id: &PortfolioId) -> Result<PortfolioSnapshot, ExecutorError<ChainError>> {
        let chain: &dyn ChainClient = self.chain.as_ref();
        self.executor
            .execute(&self.settings.snapshot_operation, move || chain.get_snapshot(id))
            .await
    }

    /// Snapshot failures are logged and counted but leave the schedule alone,
    /// so the portfolio is retried on the next tick.
    async fn on_snapshot_failure(&self, id: &PortfolioId, err: ExecutorError<ChainError>) -> PortfolioOutcome {
        let kind = err.kind();
        let message = err.to_string();
        warn!(portfolio_id = %id, %kind, error = %message, "Snapshot fetch failed.");

        self.recorder
            .record_fetch_failure(ErrorLogEntry {
                timestamp: self.clock.wall_time(),
                portfolio_id: Some(id.clone()),
                operation: self.settings.snapshot_operation.clone(),
                kind,
                message: message.clone(),
            })
            .await;
        self.events.emit(SchedulerEvent::SnapshotFailed {
            portfolio_id: id.clone(),
            kind,
            message,
        });
        PortfolioOutcome::SnapshotFailed(kind)
    }

    /// Ambient volatility for this tick. Zero when no provider is wired or the
    /// reading fails.
    async fn volatility(&self) -> Decimal {
        let Some(market) = self.market.as_deref() else {
            return Decimal::ZERO;
        };
        match self.executor.execute(VOLATILITY_OPERATION, move || market.volatility()).await {
            Ok(volatility) => volatility,
            Err(err) => {
                warn!(error = %err, "Volatility unavailable; assuming a calm market.");
                if err.kind() == ErrorKind::CircuitOpen {
                    self.events.log(LogLevel::Warn, err.to_string());
                }
                Decimal::ZERO
            }
        }
    }

    // --- Status & reporting ---

    pub async fn status(&self) -> SchedulerStatus {
        self.status_for(self.settings.status_window()).await
    }

    pub async fn status_for(&self, window: Duration) -> SchedulerStatus {
        SchedulerStatus {
            is_running: self.is_running().await,
            active_portfolio_count: self.registry.len().await,
            total_rebalances: self.recorder.total_rebalances().await,
            recent_rebalances: self.recorder.recent_since(window).await.len(),
            window_ms: window.as_millis() as u64,
        }
    }

    /// The metrics report over one reporting period.
    pub async fn report(&self) -> MetricsReport {
        let unhealthy = self.executor.unhealthy_operations().await;
        self.recorder
            .report(self.settings.report_interval(), unhealthy)
            .await
    }
}
