//! Error types for the interpreter.

use std::fmt::Display;
use thiserror::Error;

/// Errors raised while interpreting computations.
///
/// Every variant is cheap to clone so a failure can be injected back into a
/// computation and still be reported to whoever is waiting on the task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// A called operation returned an error or its future was rejected.
    #[error("operation `{operation}` failed: {message}")]
    Operation {
        /// Name of the operation.
        operation: String,
        /// The error with its context chain flattened.
        message: String,
    },

    /// A computation raised a failure of its own.
    #[error("computation failed: {0}")]
    Failed(String),

    /// The task was cancelled before it finished.
    #[error("task was cancelled")]
    Cancelled,

    /// A task had to wait on a pending call outside a tokio runtime.
    #[error("task must await a pending call but no tokio runtime is running")]
    NoRuntime,

    /// A `Call` would nest computations deeper than the configured limit.
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// The effect handler rejected an effect.
    #[error("effect handler error: {0}")]
    Handler(String),

    /// Rejected [`InterpreterConfig`](crate::InterpreterConfig).
    #[error("invalid interpreter config: {0}")]
    Config(String),
}

impl SagaError {
    /// Failure raised by a computation itself.
    pub fn failed(message: impl Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Failure of the named operation, keeping the full `anyhow` context chain.
    pub fn operation(operation: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: format!("{error:#}"),
        }
    }
}

/// Result type for interpreter operations
pub type Result<T> = std::result::Result<T, SagaError>;
