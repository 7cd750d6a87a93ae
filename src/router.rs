//! Trigger table filled by `TakeEvery` registrations.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::effect::TriggerId;
use crate::operation::Operation;

/// Maps trigger ids to the handlers registered for them, in registration order.
///
/// Entries are only ever added, and only by `TakeEvery`. They live as long
/// as the router.
///
/// ```compile_fail
/// use sagaflow::{Interpreter, Operation, Value};
///
/// let interpreter = Interpreter::new();
/// let handler = Operation::sync("h", |_| Ok(Value::Null));
/// interpreter.router().register("X".into(), handler);
/// ```
#[derive(Debug, Default)]
pub struct TriggerRouter {
    routes: RwLock<HashMap<TriggerId, Vec<Operation>>>,
}

impl TriggerRouter {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers of `trigger`. Only the interpreter
    /// registers, while performing a `TakeEvery`.
    pub(crate) fn register(&self, trigger: TriggerId, handler: Operation) {
        tracing::debug!(%trigger, handler = handler.name(), "take_every: registered");
        self.routes.write().entry(trigger).or_default().push(handler);
    }

    /// Snapshot of the handlers for `trigger`. Empty when nothing is registered.
    pub fn handlers(&self, trigger: &TriggerId) -> Vec<Operation> {
        self.routes.read().get(trigger).cloned().unwrap_or_default()
    }

    /// Every trigger with at least one handler, sorted.
    pub fn triggers(&self) -> Vec<TriggerId> {
        let mut triggers: Vec<_> = self.routes.read().keys().cloned().collect();
        triggers.sort();
        triggers
    }

    /// Number of registrations across all triggers.
    pub fn len(&self) -> usize {
        self.routes.read().values().map(Vec::len).sum()
    }

    /// True until the first registration.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
