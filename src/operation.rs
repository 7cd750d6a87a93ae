//! Callable operations invoked by `Call` and started by `TakeEvery`.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use crate::computation::Computation;
use crate::error::{Result, SagaError};

/// What invoking an operation produced.
pub enum Invocation {
    /// A plain value, available right away.
    Value(Value),
    /// A result that settles later. The calling task waits for it.
    Pending(BoxFuture<'static, Result<Value>>),
    /// A fresh computation, driven as a child of the caller.
    Computation(Box<dyn Computation>),
}

impl Debug for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
            Self::Computation(_) => f.write_str("Computation(..)"),
        }
    }
}

impl From<Value> for Invocation {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// An asynchronous service callable through `Call`.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Handle one call. An `Err` is injected into the caller.
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value>;
}

type Body = dyn Fn(Vec<Value>) -> Result<Invocation> + Send + Sync;

/// A named, cheaply clonable callable.
#[derive(Clone)]
pub struct Operation {
    name: Arc<str>,
    body: Arc<Body>,
}

impl Operation {
    /// Wrap a raw invocation function.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Invocation> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            body: Arc::new(body),
        }
    }

    /// A plain function. An `Err` is reported as a failure of this operation.
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::new(name, move |args| {
            f(args)
                .map(Invocation::Value)
                .map_err(|e| SagaError::operation(label.as_str(), e))
        })
    }

    /// A function returning a future. The caller waits for it to settle.
    pub fn future<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let label: Arc<str> = Arc::from(name.as_str());
        Self::new(name, move |args| {
            let pending = f(args);
            let label = label.clone();
            Ok(Invocation::Pending(
                async move { pending.await.map_err(|e| SagaError::operation(&*label, e)) }.boxed(),
            ))
        })
    }

    /// A generator function: every invocation builds a fresh computation.
    pub fn computation<F, C>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> C + Send + Sync + 'static,
        C: Computation + 'static,
    {
        Self::new(name, move |args| Ok(Invocation::Computation(Box::new(f(args)))))
    }

    /// An async [`Service`] object.
    pub fn service(name: impl Into<String>, service: Arc<dyn Service>) -> Self {
        let name = name.into();
        let label: Arc<str> = Arc::from(name.as_str());
        Self::new(name, move |args| {
            let service = service.clone();
            let label = label.clone();
            Ok(Invocation::Pending(
                async move {
                    service
                        .call(args)
                        .await
                        .map_err(|e| SagaError::operation(&*label, e))
                }
                .boxed(),
            ))
        })
    }

    /// Name used in logs and in [`SagaError::Operation`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the body with `args`.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Invocation> {
        (self.body)(args)
    }
}

impl Debug for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish_non_exhaustive()
    }
}
