//! # Executor Crate
//!
//! Fault-tolerant execution of outbound calls. Every call to the chain goes
//! through a `ResilientExecutor`, which applies a timeout to each attempt,
//! retries transient failures with capped exponential backoff plus jitter, and
//! keeps one circuit breaker per operation name.
//!
//! ## Public API
//!
//! - `ResilientExecutor`: Runs a call under the retry policy and its breaker.
//! - `RetryPolicy`: Attempt budget, backoff bounds and the per-attempt timeout.
//! - `CircuitBreaker`: The closed / open / half-open state machine.
//! - `Classify`: Maps an operation's error onto the shared `ErrorKind` taxonomy.
//! - `ExecutorError`: What a caller sees when a call does not succeed.

pub mod circuit_breaker;
pub mod error;
pub mod resilient;
pub mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use error::{Classify, ExecutorError};
pub use resilient::ResilientExecutor;
pub use retry::RetryPolicy;
