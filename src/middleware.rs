//! Middleware layers for effect handlers
//!
//! These composable handlers add cross-cutting concerns like tracing and
//! metrics without touching the computations themselves.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::effect::{Action, TriggerId};
use crate::error::Result;
use crate::handler::EffectHandler;
use crate::operation::{Invocation, Operation};

/// Tracing middleware that logs every effect performed
pub struct Trace<H> {
    inner: H,
    prefix: String,
}

impl<H> Trace<H> {
    /// Wrap `inner`, logging under the default prefix.
    pub fn new(inner: H) -> Self {
        Self::with_prefix(inner, "saga")
    }

    /// Wrap `inner`, tagging every log line with `prefix`.
    pub fn with_prefix(inner: H, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// The wrapped handler.
    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: EffectHandler> EffectHandler for Trace<H> {
    fn put(&self, action: &Action) -> Result<()> {
        let result = self.inner.put(action);
        match &result {
            Ok(()) => debug!(prefix = %self.prefix, action = %action.kind, "put"),
            Err(e) => warn!(prefix = %self.prefix, action = %action.kind, error = %e, "put: failed"),
        }
        result
    }

    fn call(&self, operation: &Operation, args: Vec<Value>) -> Result<Invocation> {
        let start = Instant::now();
        trace!(prefix = %self.prefix, operation = operation.name(), args = args.len(), "call: start");
        let result = self.inner.call(operation, args);
        let duration = start.elapsed();
        match &result {
            Ok(Invocation::Value(_)) => {
                debug!(prefix = %self.prefix, operation = operation.name(), ?duration, "call: returned")
            }
            Ok(Invocation::Pending(_)) => {
                debug!(prefix = %self.prefix, operation = operation.name(), ?duration, "call: pending")
            }
            Ok(Invocation::Computation(_)) => {
                debug!(prefix = %self.prefix, operation = operation.name(), "call: child computation")
            }
            Err(e) => {
                warn!(prefix = %self.prefix, operation = operation.name(), ?duration, error = %e, "call: failed")
            }
        }
        result
    }

    fn take_every(&self, trigger: &TriggerId, handler: &Operation) -> Result<()> {
        debug!(prefix = %self.prefix, %trigger, handler = handler.name(), "take_every");
        self.inner.take_every(trigger, handler)
    }
}

/// Metrics collection middleware
#[derive(Debug, Default)]
pub struct Metrics<H> {
    inner: H,
    put_count: AtomicU64,
    call_count: AtomicU64,
    take_every_count: AtomicU64,
    error_count: AtomicU64,
}

impl<H> Metrics<H> {
    /// Wrap `inner` with all counters at zero.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            put_count: AtomicU64::new(0),
            call_count: AtomicU64::new(0),
            take_every_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Puts performed.
    pub fn put_count(&self) -> u64 {
        self.put_count.load(Ordering::Relaxed)
    }

    /// Calls performed.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// `TakeEvery` registrations seen.
    pub fn take_every_count(&self) -> u64 {
        self.take_every_count.load(Ordering::Relaxed)
    }

    /// Effects the inner handler rejected, plus calls that failed synchronously.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    fn tally<T>(&self, counter: &AtomicU64, result: Result<T>) -> Result<T> {
        let counter = if result.is_ok() { counter } else { &self.error_count };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }
}

impl<H: EffectHandler> EffectHandler for Metrics<H> {
    fn put(&self, action: &Action) -> Result<()> {
        self.tally(&self.put_count, self.inner.put(action))
    }

    fn call(&self, operation: &Operation, args: Vec<Value>) -> Result<Invocation> {
        self.tally(&self.call_count, self.inner.call(operation, args))
    }

    fn take_every(&self, trigger: &TriggerId, handler: &Operation) -> Result<()> {
        self.tally(&self.take_every_count, self.inner.take_every(trigger, handler))
    }
}
