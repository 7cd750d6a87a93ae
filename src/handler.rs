//! Effect handler seam
//!
//! The interpreter decides *when* an effect happens; an EffectHandler decides
//! *what* performing it means. Swapping handlers lets the same computation run
//! against the in-memory dispatch log, a recorder, or a traced/metered stack.

use serde_json::Value;
use std::sync::Arc;

use crate::effect::{Action, TriggerId};
use crate::error::Result;
use crate::operation::{Invocation, Operation};

/// Performs the effects yielded by computations.
///
/// Called from the interpreter's synchronous step function, so
/// implementations must not block.
pub trait EffectHandler: Send + Sync + 'static {
    /// Emit a `Put` action.
    fn put(&self, action: &Action) -> Result<()>;

    /// Invoke the operation of a `Call`.
    fn call(&self, operation: &Operation, args: Vec<Value>) -> Result<Invocation> {
        operation.invoke(args)
    }

    /// Observe a `TakeEvery` registration before it reaches the router.
    fn take_every(&self, _trigger: &TriggerId, _handler: &Operation) -> Result<()> {
        Ok(())
    }
}

impl<H: EffectHandler + ?Sized> EffectHandler for Arc<H> {
    fn put(&self, action: &Action) -> Result<()> {
        (**self).put(action)
    }

    fn call(&self, operation: &Operation, args: Vec<Value>) -> Result<Invocation> {
        (**self).call(operation, args)
    }

    fn take_every(&self, trigger: &TriggerId, handler: &Operation) -> Result<()> {
        (**self).take_every(trigger, handler)
    }
}

/// A handler that drops every `Put`
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EffectHandler for NullHandler {
    fn put(&self, _action: &Action) -> Result<()> {
        Ok(())
    }
}
