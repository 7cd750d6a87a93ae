//! Generator-style effect interpretation
//!
//! Computations here are explicit state machines that never perform side
//! effects themselves. At each suspension point they yield an [`Effect`]:
//! `Put` an action into the dispatch log, `Call` an operation (plain,
//! asynchronous, or another computation), or `TakeEvery` to register a
//! handler for a trigger. An [`Interpreter`] pumps the computation, performs
//! the effect and resumes it with the result.
//!
//! ```
//! use sagaflow::{Action, Effect, Interpreter, Operation, Sequence};
//! use serde_json::json;
//!
//! let interpreter = Interpreter::new();
//! let on_fruit = Operation::computation("on_fruit", |args| {
//!     let fruit = args.into_iter().next().unwrap_or_default();
//!     Sequence::new().yield_effect(Action::with_payload("FRUIT_ADDED", fruit))
//! });
//!
//! futures::executor::block_on(
//!     interpreter.run(Sequence::new().yield_effect(Effect::take_every("ADD_FRUIT", on_fruit))),
//! )
//! .unwrap();
//!
//! interpreter.dispatch("ADD_FRUIT", json!("apple"));
//! assert_eq!(
//!     interpreter.handler().actions(),
//!     vec![Action::with_payload("FRUIT_ADDED", "apple")]
//! );
//! ```

pub mod computation;
pub mod config;
pub mod effect;
pub mod error;
pub mod handler;
pub mod impls;
pub mod interpreter;
pub mod middleware;
pub mod operation;
pub mod router;

pub use computation::{from_effects, from_fn, Computation, Coroutine, Effects, FnComputation, Resume, Sequence, Step};
pub use config::InterpreterConfig;
pub use effect::{Action, Effect, TriggerId};
pub use error::{Result, SagaError};
pub use handler::{EffectHandler, NullHandler};
pub use impls::{DispatchLog, RecordedEffect, RecordingHandler};
pub use interpreter::{Interpreter, TaskHandle, TaskId};
pub use middleware::{Metrics, Trace};
pub use operation::{Invocation, Operation, Service};

pub use serde_json::Value;
