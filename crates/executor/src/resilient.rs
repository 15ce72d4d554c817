use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::error::{Classify, ExecutorError};
use crate::retry::RetryPolicy;
use configuration::{CircuitBreakerConfig, ResilienceConfig};
use core_types::Clock;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Runs outbound calls with a timeout per attempt, retries with exponential
/// backoff and jitter, and a circuit breaker per operation name.
///
/// Breakers are created lazily the first time an operation name is seen and are
/// shared by every caller that uses that name.
pub struct ResilientExecutor {
    policy: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl ResilientExecutor {
    pub fn new(config: &ResilienceConfig, clock: Arc<dyn Clock>) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy: RetryPolicy::from(config),
            breaker_config: config.circuit_breaker.clone(),
            breakers: DashMap::new(),
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Replaces the jitter source with a deterministic one.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `f` under the executor's default policy.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let policy = self.policy;
        self.execute_with(operation, &policy, f).await
    }

    /// Runs `f` under an explicit policy. The breaker is still the one shared
    /// by every caller of `operation`.
    ///
    /// Every attempt first asks the breaker for permission, so a breaker that
    /// opens between two retries stops the remaining ones. Fatal errors return
    /// at once and leave a closed breaker untouched, but re-open a half-open
    /// one. Retryable errors and timeouts each count as one breaker failure.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut f: F,
    ) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let breaker = self.breaker(operation);
        let max_attempts = policy.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            if let Err(retry_in) = breaker.try_acquire().await {
                debug!(operation, ?retry_in, "Call rejected by open circuit breaker.");
                return Err(ExecutorError::CircuitOpen {
                    operation: operation.to_string(),
                    retry_in,
                });
            }

            attempt += 1;
            match tokio::time::timeout(policy.timeout, f()).await {
                Ok(Ok(value)) => {
                    breaker.record_success().await;
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry.");
                    }
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    let kind = err.kind();
                    if !kind.is_retryable() {
                        breaker.record_fatal().await;
                        warn!(operation, attempt, %kind, error = %err, "Non-retryable failure.");
                        return Err(ExecutorError::Fatal {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }

                    breaker.record_failure().await;
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, %kind, error = %err, "Retry budget exhausted.");
                        return Err(ExecutorError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(operation, attempt, %kind, error = %err, "Retryable failure.");
                }
                Err(_) => {
                    breaker.record_failure().await;
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, timeout = ?policy.timeout, "Attempt timed out; retry budget exhausted.");
                        return Err(ExecutorError::Timeout {
                            operation: operation.to_string(),
                            timeout: policy.timeout,
                            attempts: attempt,
                        });
                    }
                    warn!(operation, attempt, timeout = ?policy.timeout, "Attempt timed out.");
                }
            }

            let delay = policy.backoff(attempt) + self.jitter(policy.max_jitter).await;
            debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry.");
            tokio::time::sleep(delay).await;
        }
    }

    /// The breaker for `operation`, created closed on first use.
    pub fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(operation.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                operation,
                &self.breaker_config,
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(entry.value())
    }

    pub async fn breaker_snapshot(&self, operation: &str) -> Option<BreakerSnapshot> {
        let breaker = self.breakers.get(operation).map(|b| Arc::clone(b.value()))?;
        Some(breaker.snapshot().await)
    }

    /// Snapshots of every known breaker, sorted by operation name.
    pub async fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|b| Arc::clone(b.value())).collect();

        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        snapshots
    }

    /// Operations whose breaker is not closed.
    pub async fn unhealthy_operations(&self) -> Vec<String> {
        self.breaker_snapshots()
            .await
            .into_iter()
            .filter(|s| s.state != CircuitState::Closed)
            .map(|s| s.operation)
            .collect()
    }

    async fn jitter(&self, max_jitter: Duration) -> Duration {
        let bound = max_jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        let ms = self.rng.lock().await.gen_range(0..bound);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ErrorKind, SystemClock};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn config(max_retries: u32, failure_threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            max_retries,
            rng_seed: Some(7),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 2,
                cooldown_ms: 60_000,
            },
            ..ResilienceConfig::default()
        }
    }

    fn executor(max_retries: u32, failure_threshold: u32) -> ResilientExecutor {
        ResilientExecutor::new(&config(max_retries, failure_threshold), Arc::new(SystemClock))
    }

    fn failing(
        calls: &Arc<AtomicU32>,
        kind: ErrorKind,
    ) -> impl FnMut() -> std::future::Ready<Result<(), ErrorKind>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(kind))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_use_exactly_the_retry_budget() {
        let executor = executor(3, 10);
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let err = executor
            .execute("get_snapshot", failing(&calls, ErrorKind::Network))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 1s + 2s of backoff, plus at most 2 × 999ms of jitter.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");

        let snapshot = executor.breaker_snapshot("get_snapshot").await.unwrap();
        assert_eq!(snapshot.consecutive_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_aborts_without_touching_the_breaker() {
        let executor = executor(3, 1);
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .execute("submit_rebalance", failing(&calls, ErrorKind::Unauthorized))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Fatal { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = executor.breaker_snapshot("submit_rebalance").await.unwrap();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out() {
        let executor = executor(1, 5);

        let err = executor
            .execute("submit_rebalance", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ErrorKind>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Timeout { attempts: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let snapshot = executor.breaker_snapshot("submit_rebalance").await.unwrap();
        assert_eq!(snapshot.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_rejects_without_invoking_the_call() {
        let executor = executor(1, 5);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let err = executor
                .execute("submit_rebalance", failing(&calls, ErrorKind::Network))
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutorError::Exhausted { .. }));
        }

        let err = executor
            .execute("submit_rebalance", failing(&calls, ErrorKind::Network))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::CircuitOpen { .. }));
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
        assert_eq!(err.attempts(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(executor.unhealthy_operations().await, vec!["submit_rebalance".to_string()]);

        // Breakers are per operation.
        assert!(executor.execute("get_snapshot", || async { Ok::<_, ErrorKind>(1) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_breaker_closes_after_two_successes() {
        let executor = executor(1, 5);
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let _ = executor
                .execute("submit_rebalance", failing(&calls, ErrorKind::Network))
                .await;
        }

        tokio::time::advance(Duration::from_secs(60)).await;

        let ok = || async { Ok::<_, ErrorKind>("0xabc") };
        assert_eq!(executor.execute("submit_rebalance", ok).await.unwrap(), "0xabc");
        let breaker = executor.breaker("submit_rebalance");
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        executor.execute("submit_rebalance", ok).await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(executor.unhealthy_operations().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_the_breaker() {
        let executor = executor(1, 5);
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let _ = executor
                .execute("submit_rebalance", failing(&calls, ErrorKind::Network))
                .await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let _ = executor
            .execute("submit_rebalance", failing(&calls, ErrorKind::Timeout))
            .await;

        let snapshot = executor.breaker_snapshot("submit_rebalance").await.unwrap();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.retry_in, Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_while_half_open_reopens_the_breaker() {
        let executor = executor(1, 5);
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let _ = executor
                .execute("submit_rebalance", failing(&calls, ErrorKind::Network))
                .await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let err = executor
            .execute("submit_rebalance", failing(&calls, ErrorKind::Rejected))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Fatal { attempts: 1, .. }));

        let snapshot = executor.breaker_snapshot("submit_rebalance").await.unwrap();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.times_opened, 2);
        assert_eq!(snapshot.retry_in, Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_retry_clears_the_failure_streak() {
        let executor = executor(3, 5);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let value = executor
            .execute("get_snapshot", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 { Err(ErrorKind::RateLimited) } else { Ok(n) }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        let snapshot = executor.breaker_snapshot("get_snapshot").await.unwrap();
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn seeded_jitter_is_reproducible_and_bounded() {
        let a = executor(3, 5).with_rng_seed(42);
        let b = executor(3, 5).with_rng_seed(42);
        let bound = Duration::from_millis(1_000);

        for _ in 0..50 {
            let (ja, jb) = (a.jitter(bound).await, b.jitter(bound).await);
            assert_eq!(ja, jb);
            assert!(ja < bound);
        }
        assert_eq!(a.jitter(Duration::ZERO).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_policy_overrides_the_default() {
        let executor = executor(5, 10);
        let calls = Arc::new(AtomicU32::new(0));
        let policy = executor.policy().with_max_retries(2).without_jitter();

        let err = executor
            .execute_with("get_volatility", &policy, failing(&calls, ErrorKind::GasEstimation))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
