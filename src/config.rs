//! Interpreter settings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// Tunables for an [`Interpreter`](crate::Interpreter).
///
/// Deserializes with defaults for missing fields, so it can be embedded in a
/// host application's own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Deepest allowed nesting of computations started by `Call`.
    pub max_call_depth: usize,
    /// Also dispatch every `Put` action to the handlers registered for its type.
    pub route_puts: bool,
    /// Record actions fed through `dispatch_action` in the dispatch log.
    pub log_dispatches: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            route_puts: false,
            log_dispatches: false,
        }
    }
}

impl InterpreterConfig {
    /// Set the deepest allowed `Call` nesting, root frame included.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Feed `Put` actions back to `TakeEvery` handlers. Routed puts are
    /// queued and dispatched once the current step finishes, so a handler
    /// that puts its own trigger keeps the interpreter busy forever without
    /// growing the stack.
    pub fn with_route_puts(mut self, enabled: bool) -> Self {
        self.route_puts = enabled;
        self
    }

    /// Record actions given to `dispatch_action` before dispatching them.
    pub fn with_log_dispatches(mut self, enabled: bool) -> Self {
        self.log_dispatches = enabled;
        self
    }

    /// Reject settings the interpreter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_call_depth == 0 {
            return Err(SagaError::Config("max_call_depth must be at least 1".into()));
        }
        Ok(())
    }
}
