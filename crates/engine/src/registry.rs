use configuration::PortfolioConfig;
use core_types::PortfolioId;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Scheduling state of one managed portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSchedule {
    pub config: PortfolioConfig,
    pub last_rebalance_at: Option<Instant>,
    pub next_eligible_at: Instant,
    /// Claimed by a tick that has not finished with it yet.
    pub in_flight: bool,
}

impl PortfolioSchedule {
    /// A new schedule is due immediately.
    pub fn new(config: PortfolioConfig, now: Instant) -> Self {
        Self {
            config,
            last_rebalance_at: None,
            next_eligible_at: now,
            in_flight: false,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight && self.next_eligible_at <= now
    }
}

/// The set of managed portfolios.
///
/// Every method takes the lock for a single lookup or mutation and releases it
/// before returning, so no caller ever holds it across a chain call.
#[derive(Debug, Default)]
pub struct Registry {
    schedules: Mutex<BTreeMap<PortfolioId, PortfolioSchedule>>,
}

impl Registry {
    /// Inserts a schedule. Returns false, leaving the registry untouched, when
    /// the id is already present.
    pub async fn insert(&self, schedule: PortfolioSchedule) -> bool {
        let mut schedules = self.schedules.lock().await;
        if schedules.contains_key(&schedule.config.id) {
            return false;
        }
        schedules.insert(schedule.config.id.clone(), schedule);
        true
    }

    pub async fn remove(&self, id: &PortfolioId) -> Option<PortfolioSchedule> {
        self.schedules.lock().await.remove(id)
    }

    /// Swaps in a new configuration, keeping the schedule's timestamps.
    pub async fn replace_config(&self, config: PortfolioConfig) -> bool {
        let mut schedules = self.schedules.lock().await;
        match schedules.get_mut(&config.id) {
            Some(schedule) => {
                schedule.config = config;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &PortfolioId) -> Option<PortfolioSchedule> {
        self.schedules.lock().await.get(id).cloned()
    }

    /// Claims every portfolio whose `next_eligible_at` has passed and returns
    /// their configurations. A claimed portfolio is not due again until it is
    /// released, so overlapping ticks never process it twice.
    pub async fn claim_due(&self, now: Instant) -> Vec<PortfolioConfig> {
        self.schedules
            .lock()
            .await
            .values_mut()
            .filter(|s| s.is_due(now))
            .map(|s| {
                s.in_flight = true;
                s.config.clone()
            })
            .collect()
    }

    pub async fn release(&self, id: &PortfolioId) {
        if let Some(schedule) = self.schedules.lock().await.get_mut(id) {
            schedule.in_flight = false;
        }
    }

    /// Pushes the next eligible time one interval past `at`, and stamps the
    /// last rebalance when the attempt succeeded. A portfolio removed while its
    /// attempt was in flight stays removed.
    pub async fn mark_attempted(&self, id: &PortfolioId, at: Instant, success: bool) {
        let mut schedules = self.schedules.lock().await;
        if let Some(schedule) = schedules.get_mut(id) {
            schedule.next_eligible_at = at + schedule.config.interval();
            schedule.in_flight = false;
            if success {
                schedule.last_rebalance_at = Some(at);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.schedules.lock().await.len()
    }

    pub async fn ids(&self) -> Vec<PortfolioId> {
        self.schedules.lock().await.keys().cloned().collect()
    }
}
