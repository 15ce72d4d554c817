use core_types::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Implemented by the error type of any operation run through the
/// `ResilientExecutor`, so that opaque collaborator failures can be sorted into
/// retryable and fatal ones.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError<E> {
    #[error("Circuit breaker for '{operation}' is open; next probe allowed in {retry_in:?}")]
    CircuitOpen { operation: String, retry_in: Duration },

    #[error("'{operation}' timed out after {timeout:?} (attempt {attempts})")]
    Timeout {
        operation: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("'{operation}' failed with a non-retryable error on attempt {attempts}: {source}")]
    Fatal {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("'{operation}' still failing after {attempts} attempt(s): {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: Classify> ExecutorError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ExecutorError::Timeout { .. } => ErrorKind::Timeout,
            ExecutorError::Fatal { source, .. } | ExecutorError::Exhausted { source, .. } => {
                source.kind()
            }
        }
    }
}

impl<E> ExecutorError<E> {
    pub fn operation(&self) -> &str {
        match self {
            ExecutorError::CircuitOpen { operation, .. }
            | ExecutorError::Timeout { operation, .. }
            | ExecutorError::Fatal { operation, .. }
            | ExecutorError::Exhausted { operation, .. } => operation,
        }
    }

    /// Attempts that actually invoked the operation. A rejected call made none.
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::CircuitOpen { .. } => 0,
            ExecutorError::Timeout { attempts, .. }
            | ExecutorError::Fatal { attempts, .. }
            | ExecutorError::Exhausted { attempts, .. } => *attempts,
        }
    }
}
