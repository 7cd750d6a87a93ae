//! Suspendable computations.
//!
//! A computation is an explicit state machine. Each call to
//! [`Computation::resume`] runs it up to its next suspension point, where it
//! either yields an [`Effect`] for the interpreter to perform or finishes.
//! The builders in this module cover the common shapes so most callers never
//! implement the trait by hand.

use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};

use crate::effect::Effect;
use crate::error::{Result, SagaError};

/// Input delivered to a suspended computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The result of the effect the computation is suspended on.
    Next(Value),
    /// A failure raised at the suspension point.
    Throw(SagaError),
}

impl Resume {
    /// The input used to start a fresh computation. Its value is ignored.
    pub fn start() -> Self {
        Self::Next(Value::Null)
    }

    /// `Next` as `Ok`, `Throw` as `Err`, ready for `?`.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Next(value) => Ok(value),
            Self::Throw(error) => Err(error),
        }
    }
}

impl From<Result<Value>> for Resume {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::Next(value),
            Err(error) => Self::Throw(error),
        }
    }
}

/// What a computation did when resumed.
#[derive(Debug, Clone)]
pub enum Step {
    /// Paused on an effect.
    Yield(Effect),
    /// Finished with a final value.
    Complete(Value),
}

/// A unit of sequential logic that talks to the interpreter through effects.
///
/// Returning `Err` from `resume` finishes the computation with a failure.
pub trait Computation: Send {
    /// Run to the next suspension point or to the end.
    fn resume(&mut self, input: Resume) -> Result<Step>;

    /// Terminate early. Remaining suspension points are discarded.
    fn cancel(&mut self) {}
}

impl<C: Computation + ?Sized> Computation for Box<C> {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        (**self).resume(input)
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Suspended,
    Finished,
}

/// Generator-object semantics around any computation.
///
/// Once finished, by completion, failure or [`Coroutine::finish`], the body
/// is never entered again and every further `next` reports
/// `Complete(Null)`.
pub struct Coroutine<C> {
    inner: C,
    state: State,
}

impl<C: Computation> Coroutine<C> {
    /// Wrap a computation that has not started yet.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            state: State::Fresh,
        }
    }

    /// Resume with `value`. The value passed to the first call is ignored.
    pub fn next(&mut self, value: Value) -> Result<Step> {
        self.resume(Resume::Next(value))
    }

    /// Raise `error` at the current suspension point.
    pub fn throw(&mut self, error: SagaError) -> Result<Step> {
        self.resume(Resume::Throw(error))
    }

    /// Finish right away, like a generator's `return()`.
    pub fn finish(&mut self) -> Step {
        self.cancel();
        Step::Complete(Value::Null)
    }

    /// True once the body can no longer be entered.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Unwrap the computation, whatever state it is in.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Computation> Computation for Coroutine<C> {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        match (self.state, input) {
            (State::Finished, Resume::Next(_)) => Ok(Step::Complete(Value::Null)),
            (State::Finished, Resume::Throw(error)) => Err(error),
            (State::Fresh, Resume::Throw(error)) => {
                self.state = State::Finished;
                Err(error)
            }
            (_, input) => {
                let step = self.inner.resume(input);
                self.state = match step {
                    Ok(Step::Yield(_)) => State::Suspended,
                    _ => State::Finished,
                };
                step
            }
        }
    }

    fn cancel(&mut self) {
        if self.state != State::Finished {
            self.inner.cancel();
            self.state = State::Finished;
        }
    }
}

impl<C> Debug for Coroutine<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine").field("state", &self.state).finish_non_exhaustive()
    }
}

type Stage = Box<dyn FnOnce(Result<Value>) -> Result<Step> + Send>;

/// A computation written as an ordered list of stages.
///
/// Each stage receives the result of the previous suspension (the first one
/// receives `Null`) and produces the next effect.
///
/// ```
/// use sagaflow::{Action, Effect, Operation, Sequence};
/// use serde_json::json;
///
/// let add = Operation::sync("add", |args| {
///     Ok(json!(args.iter().filter_map(|v| v.as_i64()).sum::<i64>()))
/// });
/// let saga = Sequence::new()
///     .then(move |_| Ok(Effect::call_with(add, [json!(1), json!(2)])))
///     .then(|sum| Ok(Effect::put(Action::with_payload("SUM", sum))));
/// # let _ = saga;
/// ```
#[derive(Default)]
pub struct Sequence {
    stages: VecDeque<Stage>,
}

impl Sequence {
    /// A sequence with no stages. Completes with `Null` on first resume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield the effect built from the previous result. An injected failure
    /// is not caught and finishes the sequence.
    pub fn then<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Result<Effect> + Send + 'static,
    {
        self.stage(move |input| f(input?).map(Step::Yield))
    }

    /// Yield `effect`, ignoring the previous result.
    pub fn yield_effect(self, effect: impl Into<Effect>) -> Self {
        let effect = effect.into();
        self.stage(move |input| input.map(|_| Step::Yield(effect)))
    }

    /// Like [`Sequence::then`], but the stage sees an injected failure and
    /// may recover from it.
    pub fn recover<F>(self, f: F) -> Self
    where
        F: FnOnce(Result<Value>) -> Result<Effect> + Send + 'static,
    {
        self.stage(move |input| f(input).map(Step::Yield))
    }

    /// Finish with the value computed from the previous result.
    /// Stages added after this one never run.
    pub fn returning<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value> + Send + 'static,
    {
        self.stage(move |input| f(input?).map(Step::Complete))
    }

    fn stage<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<Value>) -> Result<Step> + Send + 'static,
    {
        self.stages.push_back(Box::new(f));
        self
    }

    /// Stages not yet run.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True once every stage has run.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Computation for Sequence {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        let input = input.into_result();
        let step = match self.stages.pop_front() {
            Some(stage) => stage(input),
            None => input.map(|_| Step::Complete(Value::Null)),
        };
        if !matches!(step, Ok(Step::Yield(_))) {
            self.stages.clear();
        }
        step
    }

    fn cancel(&mut self) {
        self.stages.clear();
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").field("stages", &self.stages.len()).finish()
    }
}

/// A hand-written state machine over `state`.
pub struct FnComputation<S, F> {
    state: S,
    step: F,
}

/// Build a computation from an explicit state and a step function.
///
/// ```
/// use sagaflow::{from_fn, Coroutine, Effect, Resume, Step};
/// use serde_json::json;
///
/// let counter = from_fn(0u32, |n: &mut u32, _input: Resume| {
///     *n += 1;
///     Ok(if *n <= 2 { Step::Yield(Effect::from(json!(*n))) } else { Step::Complete(json!("done")) })
/// });
/// let mut gen = Coroutine::new(counter);
/// assert!(matches!(gen.next(json!(null)), Ok(Step::Yield(_))));
/// ```
pub fn from_fn<S, F>(state: S, step: F) -> FnComputation<S, F>
where
    S: Send,
    F: FnMut(&mut S, Resume) -> Result<Step> + Send,
{
    FnComputation { state, step }
}

impl<S, F> FnComputation<S, F> {
    /// Current state of the machine.
    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S, F> Computation for FnComputation<S, F>
where
    S: Send,
    F: FnMut(&mut S, Resume) -> Result<Step> + Send,
{
    fn resume(&mut self, input: Resume) -> Result<Step> {
        (self.step)(&mut self.state, input)
    }
}

/// Yields each effect in turn, ignoring what it is resumed with.
pub struct Effects<I> {
    effects: I,
    done: bool,
}

/// Build a computation that yields every effect of `effects` in order and
/// completes with `Null`.
pub fn from_effects<I>(effects: I) -> Effects<I::IntoIter>
where
    I: IntoIterator<Item = Effect>,
    I::IntoIter: Send,
{
    Effects {
        effects: effects.into_iter(),
        done: false,
    }
}

impl<I> Computation for Effects<I>
where
    I: Iterator<Item = Effect> + Send,
{
    fn resume(&mut self, input: Resume) -> Result<Step> {
        input.into_result()?;
        if self.done {
            return Ok(Step::Complete(Value::Null));
        }
        match self.effects.next() {
            Some(effect) => Ok(Step::Yield(effect)),
            None => {
                self.done = true;
                Ok(Step::Complete(Value::Null))
            }
        }
    }

    fn cancel(&mut self) {
        self.done = true;
    }
}
