//! Effect descriptors yielded by computations.
//!
//! A computation never performs I/O itself. It yields one of these values and
//! the interpreter performs the described effect on its behalf.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

use crate::operation::Operation;

/// A message emitted by `Put` or fed in through a dispatched trigger.
///
/// Serializes to the familiar `{ "type": ..., "payload": ... }` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action type. Doubles as the trigger id when dispatched.
    #[serde(rename = "type")]
    pub kind: String,
    /// Passed to handlers as their single argument when dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Action {
    /// An action without payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// An action carrying `payload`.
    pub fn with_payload(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload.into()),
        }
    }

    /// The trigger this action fires when dispatched.
    pub fn trigger(&self) -> TriggerId {
        TriggerId::new(self.kind.clone())
    }
}

/// Identifies an external trigger that handlers can be registered under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(String);

impl TriggerId {
    /// Wrap a trigger name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The trigger name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TriggerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TriggerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TriggerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&Action> for TriggerId {
    fn from(action: &Action) -> Self {
        action.trigger()
    }
}

/// The closed set of effects a computation may yield.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Emit `Action` into the dispatch log. Resumes with `Null`.
    Put(Action),
    /// Invoke `operation` with `args`. Resumes with its result or its failure.
    Call {
        /// What to invoke.
        operation: Operation,
        /// Arguments, passed as given.
        args: Vec<Value>,
    },
    /// Start `handler` afresh on every later dispatch of `trigger`.
    /// Resumes with `Null` right away.
    TakeEvery {
        /// Trigger to listen on.
        trigger: TriggerId,
        /// Operation started for every dispatch.
        handler: Operation,
    },
    /// A bare marker with no external effect. Resumes with `Null`.
    NoOp(Value),
}

impl Effect {
    /// Emit `action`.
    pub fn put(action: Action) -> Self {
        Self::Put(action)
    }

    /// `Call` without arguments.
    pub fn call(operation: Operation) -> Self {
        Self::Call {
            operation,
            args: Vec::new(),
        }
    }

    /// `Call` with the given arguments.
    pub fn call_with<I>(operation: Operation, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::Call {
            operation,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Register `handler` for every later dispatch of `trigger`.
    pub fn take_every(trigger: impl Into<TriggerId>, handler: Operation) -> Self {
        Self::TakeEvery {
            trigger: trigger.into(),
            handler,
        }
    }

    /// A plain `yield;` with nothing attached.
    pub fn noop() -> Self {
        Self::NoOp(Value::Null)
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Put(_) => "put",
            Self::Call { .. } => "call",
            Self::TakeEvery { .. } => "take_every",
            Self::NoOp(_) => "noop",
        }
    }
}

/// Any plain value yielded in place of a descriptor is a no-op marker.
impl From<Value> for Effect {
    fn from(value: Value) -> Self {
        Self::NoOp(value)
    }
}

impl From<Action> for Effect {
    fn from(action: Action) -> Self {
        Self::Put(action)
    }
}
