//! Concrete effect handlers
//!
//! - DispatchLog: ordered log of every put, shared between clones
//! - RecordingHandler: captures every effect for verification in tests

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use crate::effect::{Action, TriggerId};
use crate::error::Result;
use crate::handler::EffectHandler;
use crate::operation::{Invocation, Operation};

/// Ordered record of every action emitted by `Put`.
///
/// Clones share the same storage, so keep one to read the log after handing
/// another to an interpreter.
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl DispatchLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action emitted so far, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    /// Number of actions recorded.
    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    /// True while nothing has been put.
    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Forget every recorded action. Clones see the cleared log too.
    pub fn clear(&self) {
        self.actions.lock().clear();
    }
}

impl EffectHandler for DispatchLog {
    fn put(&self, action: &Action) -> Result<()> {
        self.actions.lock().push(action.clone());
        Ok(())
    }
}

/// An effect seen by a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum RecordedEffect {
    Put { action: Action },
    Call { operation: String, args: Vec<Value> },
    TakeEvery { trigger: TriggerId, handler: String },
}

/// Recording handler for testing - captures all effects in the order performed.
///
/// Calls are still invoked so computations keep running normally.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<RecordedEffect>>>,
}

impl RecordingHandler {
    /// A recorder with no events yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every effect performed so far, oldest first.
    pub fn events(&self) -> Vec<RecordedEffect> {
        self.events.lock().clone()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EffectHandler for RecordingHandler {
    fn put(&self, action: &Action) -> Result<()> {
        self.events.lock().push(RecordedEffect::Put {
            action: action.clone(),
        });
        Ok(())
    }

    fn call(&self, operation: &Operation, args: Vec<Value>) -> Result<Invocation> {
        self.events.lock().push(RecordedEffect::Call {
            operation: operation.name().to_string(),
            args: args.clone(),
        });
        operation.invoke(args)
    }

    fn take_every(&self, trigger: &TriggerId, handler: &Operation) -> Result<()> {
        self.events.lock().push(RecordedEffect::TakeEvery {
            trigger: trigger.clone(),
            handler: handler.name().to_string(),
        });
        Ok(())
    }
}
