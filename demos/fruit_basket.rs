// Demonstration of the effect interpreter
// A root computation registers handlers with takeEvery; dispatched triggers
// then start fresh handler instances that call operations and put actions.

use sagaflow::{
    Action, DispatchLog, Effect, Interpreter, InterpreterConfig, Metrics, Operation, Sequence, Trace, Value,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn fetch_basket() -> Operation {
    Operation::future("fetch_basket", |_| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, anyhow::Error>(json!({ "weight": 1, "fruits": ["apple", "orange"] }))
    })
}

fn weigh() -> Operation {
    Operation::sync("weigh", |args| {
        let count = args
            .first()
            .and_then(|basket| basket.get("fruits"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        Ok(json!(count))
    })
}

fn on_basket_wanted() -> Operation {
    Operation::computation("on_basket_wanted", |_| {
        let (fetch, weigh) = (fetch_basket(), weigh());
        Sequence::new()
            .then(move |_| Ok(Effect::call(fetch)))
            .then(move |basket| Ok(Effect::call_with(weigh, [basket])))
            .then(|count| Ok(Effect::put(Action::with_payload("BASKET_READY", count))))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sagaflow=debug")))
        .init();

    let log = DispatchLog::new();
    let handler = Arc::new(Metrics::new(Trace::new(log.clone())));
    let config = InterpreterConfig::default().with_log_dispatches(true);
    let interpreter = Interpreter::with_config(handler.clone(), config)?;

    interpreter
        .run(Sequence::new().yield_effect(Effect::take_every("BASKET_WANTED", on_basket_wanted())))
        .await?;

    let handles: Vec<_> = (0..3)
        .flat_map(|_| interpreter.dispatch_action(Action::new("BASKET_WANTED")))
        .collect();
    for handle in handles {
        handle.join().await?;
    }

    for action in log.actions() {
        println!("{}", serde_json::to_string(&action)?);
    }
    println!(
        "puts: {}, calls: {}, registrations: {}, errors: {}",
        handler.put_count(),
        handler.call_count(),
        handler.take_every_count(),
        handler.error_count()
    );
    Ok(())
}
