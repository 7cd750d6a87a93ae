// Driver loop behaviour: put, call, child computations, pending results, failures

mod common;

use anyhow::anyhow;
use async_trait::async_trait;
use common::{init_tracing, kinds, Basket};
use parking_lot::Mutex;
use sagaflow::{
    from_effects, from_fn, Action, Effect, Interpreter, InterpreterConfig, Operation, RecordedEffect,
    RecordingHandler, SagaError, Sequence, Service, Step, Value,
};
use serde_json::json;
use std::sync::Arc;

fn add_to_basket() -> Operation {
    Operation::sync("add_to_basket", |args| {
        let mut args = args.into_iter();
        let mut basket = match args.next() {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        basket.extend(args);
        Ok(Value::Array(basket))
    })
}

fn failing(message: &'static str) -> Operation {
    Operation::sync("failing", move |_| Err(anyhow!(message)))
}

#[tokio::test]
async fn bare_yields_interleave_without_effects() {
    init_tracing();
    let fruits = Basket::default();
    let basket = fruits.clone();
    let saga = from_fn(0u8, move |at: &mut u8, _| {
        *at += 1;
        Ok(match *at {
            1 => {
                basket.push("apple");
                Step::Yield(Effect::noop())
            }
            2 => {
                basket.push("orange");
                Step::Yield(Effect::from(json!("marker")))
            }
            _ => {
                basket.push("kiwi");
                Step::Complete(Value::Null)
            }
        })
    });

    let interpreter = Interpreter::new();
    assert_eq!(interpreter.run(saga).await, Ok(Value::Null));
    assert_eq!(fruits.items(), ["apple", "orange", "kiwi"]);
    assert!(interpreter.handler().is_empty());
}

#[tokio::test]
async fn puts_are_logged_in_yield_order() {
    init_tracing();
    let interpreter = Interpreter::new();
    interpreter
        .run(from_effects([
            Effect::put(Action::with_payload("FRUIT", "apple")),
            Effect::put(Action::with_payload("FRUIT", "orange")),
        ]))
        .await
        .unwrap();

    assert_eq!(
        interpreter.handler().actions(),
        vec![
            Action::with_payload("FRUIT", "apple"),
            Action::with_payload("FRUIT", "orange"),
        ]
    );
}

#[tokio::test]
async fn call_invokes_plain_functions_in_order() {
    init_tracing();
    let fruits = Basket::default();
    let saga = from_effects([
        Effect::call(fruits.adder("apple")),
        Effect::call(fruits.adder("orange")),
        Effect::call(fruits.adder("kiwi")),
    ]);

    Interpreter::new().run(saga).await.unwrap();
    assert_eq!(fruits.items(), ["apple", "orange", "kiwi"]);
}

#[tokio::test]
async fn call_resumes_with_the_returned_value() {
    init_tracing();
    let add = add_to_basket();
    let (a, b, c) = (add.clone(), add.clone(), add);
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call_with(a, [json!([]), json!("apple")])))
        .then(move |basket1| Ok(Effect::call_with(b, [basket1, json!("orange"), json!("pineapple")])))
        .then(move |basket2| Ok(Effect::call_with(c, [basket2, json!("kiwi")])))
        .returning(Ok);

    let basket = Interpreter::new().run(saga).await.unwrap();
    assert_eq!(basket, json!(["apple", "orange", "pineapple", "kiwi"]));
}

#[tokio::test]
async fn call_drives_child_computations_to_completion() {
    init_tracing();
    let dispatch_fruit = Operation::computation("dispatch_fruit", |args| {
        let fruit = args.into_iter().next().unwrap_or_default();
        Sequence::new()
            .yield_effect(Action::with_payload("FRUIT_ADDED", fruit.clone()))
            .returning(move |_| Ok(json!({ "added": fruit })))
    });
    let (first, second) = (dispatch_fruit.clone(), dispatch_fruit);
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call_with(first, ["apple"])))
        .then(move |added| {
            assert_eq!(added, json!({ "added": "apple" }));
            Ok(Effect::call_with(second, ["orange"]))
        });

    let interpreter = Interpreter::new();
    interpreter.run(saga).await.unwrap();
    assert_eq!(
        interpreter.handler().actions(),
        vec![
            Action::with_payload("FRUIT_ADDED", "apple"),
            Action::with_payload("FRUIT_ADDED", "orange"),
        ]
    );
}

#[tokio::test]
async fn pending_call_resumes_only_after_it_settles() {
    init_tracing();
    let (tx, rx) = tokio::sync::oneshot::channel::<Value>();
    let rx = Arc::new(Mutex::new(Some(rx)));
    let wait = Operation::future("wait", move |_| {
        let rx = rx.lock().take();
        async move {
            match rx {
                Some(rx) => rx.await.map_err(anyhow::Error::from),
                None => Err(anyhow!("already awaited")),
            }
        }
    });
    let saga = Sequence::new()
        .yield_effect(Action::new("BEFORE"))
        .then(move |_| Ok(Effect::call(wait)))
        .then(|settled| Ok(Effect::put(Action::with_payload("AFTER", settled))));

    let interpreter = Interpreter::new();
    let handle = interpreter.spawn(saga);
    assert_eq!(kinds(&interpreter.handler().actions()), ["BEFORE"]);

    tokio::task::yield_now().await;
    assert_eq!(kinds(&interpreter.handler().actions()), ["BEFORE"]);

    tx.send(json!("settled")).unwrap();
    assert_eq!(handle.join().await, Ok(Value::Null));
    assert_eq!(
        interpreter.handler().actions(),
        vec![Action::new("BEFORE"), Action::with_payload("AFTER", "settled")]
    );
}

#[tokio::test]
async fn promise_chain_feeds_put() {
    init_tracing();
    let get_data = Operation::future("get_data", |_| async {
        Ok::<_, anyhow::Error>(json!("Bill Gates, Steve Jobs"))
    });
    let transform = Operation::future("transform", |args| async move {
        let data = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
        let people: Vec<Value> = data
            .split(", ")
            .map(|person| {
                let mut parts = person.split(' ');
                json!({ "first": parts.next(), "last": parts.next() })
            })
            .collect();
        Ok::<_, anyhow::Error>(Value::Array(people))
    });
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call(get_data)))
        .then(move |data| Ok(Effect::call_with(transform, [data])))
        .then(|people| Ok(Effect::put(Action::with_payload("NAMES_RETRIEVED", people))));

    let interpreter = Interpreter::new();
    interpreter.run(saga).await.unwrap();
    assert_eq!(
        interpreter.handler().actions(),
        vec![Action::with_payload(
            "NAMES_RETRIEVED",
            json!([
                { "first": "Bill", "last": "Gates" },
                { "first": "Steve", "last": "Jobs" },
            ])
        )]
    );
}

#[tokio::test]
async fn operation_failure_is_injected_and_recoverable() {
    init_tracing();
    let saga = Sequence::new()
        .then(|_| Ok(Effect::call(failing("no fruit"))))
        .recover(|result| {
            let message = match result {
                Ok(_) => "unexpected".to_string(),
                Err(e) => e.to_string(),
            };
            Ok(Effect::put(Action::with_payload("RECOVERED", message)))
        });

    let interpreter = Interpreter::new();
    assert_eq!(interpreter.run(saga).await, Ok(Value::Null));
    assert_eq!(
        interpreter.handler().actions(),
        vec![Action::with_payload(
            "RECOVERED",
            "operation `failing` failed: no fruit"
        )]
    );
}

#[tokio::test]
async fn rejected_future_is_injected() {
    init_tracing();
    let reject = Operation::future("reject", |_| async { Err::<Value, _>(anyhow!("offline")) });
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call(reject)))
        .recover(|result| Ok(Effect::put(Action::with_payload("FAILED", result.is_err()))));

    let interpreter = Interpreter::new();
    interpreter.run(saga).await.unwrap();
    assert_eq!(interpreter.handler().actions(), vec![Action::with_payload("FAILED", true)]);
}

#[tokio::test]
async fn uncaught_failure_unwinds_through_parent_calls() {
    init_tracing();
    let child = Operation::computation("child", |_| {
        Sequence::new()
            .then(|_| Ok(Effect::call(failing("bad apple"))))
            .yield_effect(Action::new("CHILD_AFTER"))
    });
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call(child)))
        .yield_effect(Action::new("PARENT_AFTER"));

    let interpreter = Interpreter::new();
    let result = interpreter.run(saga).await;
    assert_eq!(
        result,
        Err(SagaError::Operation {
            operation: "failing".into(),
            message: "bad apple".into()
        })
    );
    assert!(interpreter.handler().is_empty());
}

#[tokio::test]
async fn parent_catches_child_failure() {
    init_tracing();
    let child = Operation::computation("child", |_| {
        from_fn((), |_, _| Err(SagaError::failed("child gave up")))
    });
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call(child)))
        .recover(|result| Ok(Effect::put(Action::with_payload("CAUGHT", result.is_err()))))
        .returning(|_| Ok(json!("survived")));

    let interpreter = Interpreter::new();
    assert_eq!(interpreter.run(saga).await, Ok(json!("survived")));
    assert_eq!(interpreter.handler().actions(), vec![Action::with_payload("CAUGHT", true)]);
}

struct FruitService;

#[async_trait]
impl Service for FruitService {
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        tokio::task::yield_now().await;
        Ok(json!({ "weight": args.len(), "fruits": ["apple", "orange"] }))
    }
}

#[tokio::test]
async fn service_calls_are_awaited() {
    init_tracing();
    let fetch = Operation::service("fetch_fruit_basket", Arc::new(FruitService));
    let saga = Sequence::new()
        .then(move |_| Ok(Effect::call_with(fetch, [json!(1)])))
        .returning(Ok);

    let basket = Interpreter::new().run(saga).await.unwrap();
    assert_eq!(basket, json!({ "weight": 1, "fruits": ["apple", "orange"] }));
}

fn recurse() -> Operation {
    Operation::computation("recurse", |_| Sequence::new().then(|_| Ok(Effect::call(recurse()))))
}

#[tokio::test]
async fn call_depth_limit_is_enforced() {
    init_tracing();
    let config = InterpreterConfig::default().with_max_call_depth(4);
    let interpreter = Interpreter::with_config(sagaflow::DispatchLog::new(), config).unwrap();
    let result = interpreter.run(Sequence::new().then(|_| Ok(Effect::call(recurse())))).await;
    assert_eq!(result, Err(SagaError::CallDepthExceeded(4)));
}

#[test]
fn zero_call_depth_is_rejected() {
    let config = InterpreterConfig::default().with_max_call_depth(0);
    assert!(matches!(
        Interpreter::with_config(sagaflow::NullHandler, config),
        Err(SagaError::Config(_))
    ));
}

#[tokio::test]
async fn recording_handler_sees_effects_in_order() {
    init_tracing();
    let recorder = RecordingHandler::new();
    let interpreter = Interpreter::with_handler(recorder.clone());
    let noop = Operation::sync("noop", |_| Ok(Value::Null));
    let saga = from_effects([
        Effect::put(Action::new("A")),
        Effect::call_with(noop.clone(), [1]),
        Effect::take_every("T", noop),
        Effect::noop(),
    ]);
    interpreter.run(saga).await.unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            RecordedEffect::Put { action: Action::new("A") },
            RecordedEffect::Call {
                operation: "noop".into(),
                args: vec![json!(1)]
            },
            RecordedEffect::TakeEvery {
                trigger: "T".into(),
                handler: "noop".into()
            },
        ]
    );
}
