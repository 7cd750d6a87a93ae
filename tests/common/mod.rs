// Shared helpers for integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use sagaflow::{Action, Operation, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Route interpreter logs to the test output. Set `RUST_LOG=sagaflow=trace` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared list that plain operations push into.
#[derive(Clone, Default)]
pub struct Basket(Arc<Mutex<Vec<String>>>);

impl Basket {
    pub fn push(&self, item: impl Into<String>) {
        self.0.lock().push(item.into());
    }

    pub fn items(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// An operation that pushes `item` every time it is called.
    pub fn adder(&self, item: &'static str) -> Operation {
        let basket = self.clone();
        Operation::sync(format!("add_{item}"), move |_| {
            basket.push(item);
            Ok(Value::Null)
        })
    }
}

pub fn kinds(actions: &[Action]) -> Vec<&str> {
    actions.iter().map(|a| a.kind.as_str()).collect()
}
