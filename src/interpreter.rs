//! The driver loop.
//!
//! An [`Interpreter`] resumes a computation, performs the effect it yields
//! and feeds the result back in, until the computation finishes. Child
//! computations started by `Call` are kept on a per-task stack so the parent
//! stays paused across the callee's entire run.
//!
//! Stepping is synchronous. A task only gives up control when a `Call`
//! returns a pending result; the rest of the task then continues on the
//! tokio runtime once that result settles. Tasks may be parked on different
//! worker threads, but all stepping goes through one interpreter-wide gate,
//! so only one computation executes at a time.

use futures::channel::oneshot;
use futures::future::{AbortHandle, Abortable, BoxFuture};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn, Instrument};

use crate::computation::{Computation, Coroutine, Resume, Step};
use crate::config::InterpreterConfig;
use crate::effect::{Action, Effect, TriggerId};
use crate::error::{Result, SagaError};
use crate::handler::EffectHandler;
use crate::impls::DispatchLog;
use crate::operation::Invocation;
use crate::router::TriggerRouter;

/// Identifies one task launched by an interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a task started by [`Interpreter::spawn`] or
/// [`Interpreter::dispatch`].
///
/// Dropping the handle detaches the task; it keeps running.
pub struct TaskHandle {
    id: TaskId,
    abort: AbortHandle,
    result: oneshot::Receiver<Result<Value>>,
}

impl TaskHandle {
    /// The id shown in this task's log lines.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Terminate the task. Its computations are finalized without reaching
    /// their remaining suspension points. No effect once it has finished.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Wait for the task's final value or failure.
    pub async fn join(self) -> Result<Value> {
        self.result.await.unwrap_or(Err(SagaError::Cancelled))
    }
}

impl Debug for TaskHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

#[derive(Default)]
struct GateState {
    depth: usize,
    routed: VecDeque<(TriggerId, Value)>,
}

/// Interpreter-wide exclusion for synchronous stepping.
///
/// Re-entrant: `dispatch` steps the handlers it starts while the caller may
/// already be inside a step.
#[derive(Default)]
struct StepGate {
    state: ReentrantMutex<RefCell<GateState>>,
}

impl StepGate {
    fn enter(&self) -> Entered<'_> {
        let state = self.state.lock();
        state.borrow_mut().depth += 1;
        Entered { state }
    }

    fn route(&self, trigger: TriggerId, payload: Value) {
        self.state.lock().borrow_mut().routed.push_back((trigger, payload));
    }
}

struct Entered<'a> {
    state: ReentrantMutexGuard<'a, RefCell<GateState>>,
}

impl Entered<'_> {
    fn is_outermost(&self) -> bool {
        self.state.borrow().depth == 1
    }

    fn next_routed(&self) -> Option<(TriggerId, Value)> {
        self.state.borrow_mut().routed.pop_front()
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().depth -= 1;
    }
}

/// One root computation plus the children it is currently calling.
struct Task {
    id: TaskId,
    stack: Vec<Coroutine<Box<dyn Computation>>>,
    gate: Arc<StepGate>,
}

impl Task {
    fn push(&mut self, computation: Box<dyn Computation>) {
        self.stack.push(Coroutine::new(computation));
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.stack.is_empty() {
            return;
        }
        debug!(task = %self.id, frames = self.stack.len(), "task dropped before completion");
        let _step = self.gate.state.lock();
        while let Some(mut frame) = self.stack.pop() {
            frame.cancel();
        }
    }
}

enum Progress {
    Finished(Result<Value>),
    Blocked(BoxFuture<'static, Result<Value>>),
}

enum Outcome {
    Ready(Result<Value>),
    Pending(BoxFuture<'static, Result<Value>>),
    Child(Box<dyn Computation>),
}

struct Shared<H> {
    handler: H,
    router: TriggerRouter,
    config: InterpreterConfig,
    gate: Arc<StepGate>,
    next_task: AtomicU64,
}

/// Drives computations and routes triggers to the handlers they registered.
///
/// Cloning is cheap; clones share the handler, router and config.
pub struct Interpreter<H = DispatchLog> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for Interpreter<H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<H> Debug for Interpreter<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.shared.config)
            .field("router", &self.shared.router)
            .finish_non_exhaustive()
    }
}

impl Interpreter<DispatchLog> {
    /// An interpreter recording puts in a fresh [`DispatchLog`].
    pub fn new() -> Self {
        Self::with_handler(DispatchLog::new())
    }
}

impl Default for Interpreter<DispatchLog> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: EffectHandler> Interpreter<H> {
    /// An interpreter performing effects through `handler`, with the default
    /// config.
    pub fn with_handler(handler: H) -> Self {
        Self::build(handler, InterpreterConfig::default())
    }

    /// Like [`Interpreter::with_handler`], rejecting an invalid `config`.
    pub fn with_config(handler: H, config: InterpreterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(handler, config))
    }

    fn build(handler: H, config: InterpreterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                router: TriggerRouter::new(),
                config,
                gate: Arc::default(),
                next_task: AtomicU64::new(1),
            }),
        }
    }

    /// The handler every effect goes through.
    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    /// Settings this interpreter was built with.
    pub fn config(&self) -> &InterpreterConfig {
        &self.shared.config
    }

    /// Read access to the registrations made by `TakeEvery`.
    pub fn router(&self) -> &TriggerRouter {
        &self.shared.router
    }

    /// Drive `root` to completion and return its final value or failure.
    ///
    /// Pending calls are awaited by whatever executor polls this future.
    pub async fn run<C: Computation + 'static>(&self, root: C) -> Result<Value> {
        let mut task = self.task();
        let id = task.id;
        task.push(Box::new(root));
        debug!(task = %id, "run: start");
        let result = self.drive(task, Resume::start()).await;
        report(id, &result);
        result
    }

    /// Start `root` and return right away.
    ///
    /// The computation runs synchronously until it first awaits a pending
    /// call, so registrations it makes before that point are in place when
    /// this returns. The remainder runs on the current tokio runtime.
    pub fn spawn<C: Computation + 'static>(&self, root: C) -> TaskHandle {
        self.launch(Ok(Invocation::Computation(Box::new(root))))
    }

    /// Start a fresh instance of every handler registered for `trigger`, in
    /// registration order, each invoked with `payload`.
    ///
    /// Never waits for the handlers. An unregistered trigger starts nothing.
    pub fn dispatch(&self, trigger: impl Into<TriggerId>, payload: Value) -> Vec<TaskHandle> {
        let trigger = trigger.into();
        self.exclusive(|| {
            let handlers = self.router().handlers(&trigger);
            if handlers.is_empty() {
                trace!(%trigger, "dispatch: no handlers");
                return Vec::new();
            }
            debug!(%trigger, handlers = handlers.len(), "dispatch");
            handlers
                .iter()
                .map(|handler| self.launch(handler.invoke(vec![payload.clone()])))
                .collect()
        })
    }

    /// Dispatch `action.kind` with the action's payload, recording the action
    /// itself first when `log_dispatches` is set.
    pub fn dispatch_action(&self, action: Action) -> Vec<TaskHandle> {
        self.exclusive(|| {
            if self.config().log_dispatches {
                if let Err(e) = self.handler().put(&action) {
                    warn!(action = %action.kind, error = %e, "dispatch: failed to record action");
                }
            }
            let trigger = action.trigger();
            self.dispatch(trigger, action.payload.unwrap_or(Value::Null))
        })
    }

    fn task(&self) -> Task {
        Task {
            id: TaskId(self.shared.next_task.fetch_add(1, Ordering::Relaxed)),
            stack: Vec::new(),
            gate: self.shared.gate.clone(),
        }
    }

    /// Run `step` holding the step gate. The outermost holder then drains
    /// the puts queued for routing, one dispatch at a time.
    fn exclusive<T>(&self, step: impl FnOnce() -> T) -> T {
        let entered = self.shared.gate.enter();
        let out = step();
        if entered.is_outermost() {
            while let Some((trigger, payload)) = entered.next_routed() {
                trace!(%trigger, "routing put");
                self.dispatch(trigger, payload);
            }
        }
        out
    }

    fn launch(&self, invocation: Result<Invocation>) -> TaskHandle {
        let mut task = self.task();
        let id = task.id;
        let (sender, receiver) = oneshot::channel();
        let (abort, registration) = AbortHandle::new_pair();

        let progress = match invocation {
            Ok(Invocation::Value(value)) => Progress::Finished(Ok(value)),
            Ok(Invocation::Pending(pending)) => Progress::Blocked(pending),
            Ok(Invocation::Computation(root)) => {
                task.push(root);
                self.advance(&mut task, Resume::start())
            }
            Err(e) => Progress::Finished(Err(e)),
        };

        match progress {
            Progress::Finished(result) => {
                report(id, &result);
                let _ = sender.send(result);
            }
            Progress::Blocked(pending) => match Handle::try_current() {
                Ok(runtime) => {
                    trace!(task = %id, "continuing on runtime");
                    let this = self.clone();
                    let body = async move {
                        let settled = pending.await;
                        let result = this.drive(task, Resume::from(settled)).await;
                        report(id, &result);
                        let _ = sender.send(result);
                    };
                    runtime.spawn(Abortable::new(body, registration).instrument(tracing::debug_span!("task", id = %id)));
                }
                Err(_) => {
                    error!(task = %id, "task blocked on a pending call outside a tokio runtime");
                    drop(task);
                    let _ = sender.send(Err(SagaError::NoRuntime));
                }
            },
        }

        TaskHandle {
            id,
            abort,
            result: receiver,
        }
    }

    async fn drive(&self, mut task: Task, mut input: Resume) -> Result<Value> {
        loop {
            match self.advance(&mut task, input) {
                Progress::Finished(result) => return result,
                Progress::Blocked(pending) => {
                    trace!(task = %task.id, "awaiting pending call");
                    input = Resume::from(pending.await);
                }
            }
        }
    }

    /// Step `task` until it finishes or blocks on a pending call.
    fn advance(&self, task: &mut Task, input: Resume) -> Progress {
        self.exclusive(|| self.step(task, input))
    }

    fn step(&self, task: &mut Task, mut input: Resume) -> Progress {
        loop {
            let depth = task.stack.len();
            let Some(frame) = task.stack.last_mut() else {
                return Progress::Finished(input.into_result());
            };

            match frame.resume(input) {
                Ok(Step::Yield(effect)) => {
                    trace!(task = %task.id, depth, effect = effect.kind(), "yield");
                    input = match self.perform(effect) {
                        Outcome::Ready(result) => Resume::from(result),
                        Outcome::Pending(pending) => return Progress::Blocked(pending),
                        Outcome::Child(child) => {
                            let limit = self.config().max_call_depth;
                            if depth >= limit {
                                warn!(task = %task.id, limit, "call depth exceeded");
                                Resume::Throw(SagaError::CallDepthExceeded(limit))
                            } else {
                                task.push(child);
                                Resume::start()
                            }
                        }
                    };
                }
                Ok(Step::Complete(value)) => {
                    task.stack.pop();
                    trace!(task = %task.id, depth, "frame complete");
                    input = Resume::Next(value);
                }
                Err(e) => {
                    task.stack.pop();
                    trace!(task = %task.id, depth, error = %e, "frame failed");
                    input = Resume::Throw(e);
                }
            }
        }
    }

    fn perform(&self, effect: Effect) -> Outcome {
        let handler = self.handler();
        match effect {
            Effect::NoOp(_) => Outcome::Ready(Ok(Value::Null)),
            Effect::Put(action) => {
                let result = handler.put(&action);
                if result.is_ok() && self.config().route_puts {
                    let trigger = action.trigger();
                    self.shared.gate.route(trigger, action.payload.unwrap_or(Value::Null));
                }
                Outcome::Ready(result.map(|()| Value::Null))
            }
            Effect::Call { operation, args } => match handler.call(&operation, args) {
                Ok(Invocation::Value(value)) => Outcome::Ready(Ok(value)),
                Ok(Invocation::Pending(pending)) => Outcome::Pending(pending),
                Ok(Invocation::Computation(child)) => Outcome::Child(child),
                Err(e) => Outcome::Ready(Err(e)),
            },
            Effect::TakeEvery {
                trigger,
                handler: taker,
            } => {
                let result = handler.take_every(&trigger, &taker);
                if result.is_ok() {
                    self.router().register(trigger, taker);
                }
                Outcome::Ready(result.map(|()| Value::Null))
            }
        }
    }
}

fn report(id: TaskId, result: &Result<Value>) {
    match result {
        Ok(_) => debug!(task = %id, "task finished"),
        Err(e) => warn!(task = %id, error = %e, "task failed"),
    }
}
