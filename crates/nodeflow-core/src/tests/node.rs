use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::action::Action;
use crate::advanced::{ConditionalNode, LoopNode, MapNode, TimeoutNode};
use crate::batch::{BatchNode, ParallelBatchNode};
use crate::context::{keys, Context};
use crate::error::FlowError;
use crate::lifecycle::FnNode;
use crate::node::NodeHandle;
use crate::observe::MemoryObserver;
use crate::params::Params;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// Node that stores a marker under `key` when it runs
fn marker(name: &'static str, key: &'static str) -> NodeHandle {
    FnNode::builder(name)
        .exec(move |ctx, _params, _input| async move {
            ctx.set(key, true);
            Ok(Value::Null)
        })
        .post(move |_ctx, _params, _prep, _res| async move { Ok(Action::new(name)) })
        .build()
}

#[tokio::test]
async fn test_empty_node_routes_default() {
    let node = FnNode::builder("noop").build();
    let action = node.run(&Context::new(), &Params::new()).await.unwrap();
    assert_eq!(action, Action::Default);
}

#[tokio::test]
async fn test_stages_see_prepared_value_and_result() {
    let node = FnNode::builder("square")
        .prep(|ctx, _params| async move { Ok(ctx.get("n").unwrap_or(Value::Null)) })
        .exec(|_ctx, _params, n| async move {
            let n = n.as_i64().unwrap_or_default();
            Ok(json!(n * n))
        })
        .post(|ctx, _params, prepared, result| async move {
            ctx.set("prepared", prepared);
            ctx.set("result", result);
            Ok(Action::new("done"))
        })
        .build();

    let ctx = Context::new();
    ctx.set("n", 7);
    let action = node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(action, Action::new("done"));
    assert_eq!(ctx.get("prepared"), Some(json!(7)));
    assert_eq!(ctx.get("result"), Some(json!(49)));
}

#[tokio::test(start_paused = true)]
async fn test_exec_runs_exactly_max_retries_times() {
    let calls = counter();
    let node = FnNode::builder("always_fails")
        .exec({
            let calls = calls.clone();
            move |_ctx, _params, _input| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(FlowError::execution("boom"))
                }
            }
        })
        .max_retries(3)
        .wait(Duration::from_millis(10))
        .build();

    let started = Instant::now();
    let result = node.run(&Context::new(), &Params::new()).await;
    assert_eq!(result, Err(FlowError::execution("boom")));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // waits happen between attempts only
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(20));
    assert!(elapsed < Duration::from_millis(30));
}

#[tokio::test]
async fn test_retry_recovers_and_reports_metric() {
    let calls = counter();
    let observer = MemoryObserver::new();
    let ctx = Context::new();
    ctx.set_observer(Arc::new(observer.clone()));

    let node = FnNode::builder("flaky")
        .exec({
            let calls = calls.clone();
            move |_ctx, _params, _input| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FlowError::execution("transient"))
                    } else {
                        Ok(json!("ok"))
                    }
                }
            }
        })
        .max_retries(3)
        .build();

    node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(observer.metric_total("node.retry"), 1.0);
    let spans = observer.named("node.run");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].tag("node"), Some("flaky"));
    assert_eq!(spans[0].tag("outcome"), Some("ok"));
}

#[tokio::test]
async fn test_fallback_called_once_and_feeds_post() {
    let calls = counter();
    let fallbacks = counter();
    let node = FnNode::builder("with_fallback")
        .exec({
            let calls = calls.clone();
            move |_ctx, _params, _input| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(FlowError::execution("unavailable"))
                }
            }
        })
        .fallback({
            let fallbacks = fallbacks.clone();
            move |_ctx, _params, _input, err| {
                let fallbacks = fallbacks.clone();
                async move {
                    fallbacks.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(format!("recovered from {}", err)))
                }
            }
        })
        .post(|ctx, _params, _prep, result| async move {
            ctx.set("result", result);
            Ok(Action::Default)
        })
        .max_retries(2)
        .build();

    let ctx = Context::new();
    node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    assert_eq!(
        ctx.get("result"),
        Some(json!("recovered from Execution error: unavailable"))
    );
}

#[tokio::test]
async fn test_failing_fallback_is_wrapped() {
    let node = FnNode::builder("doomed")
        .exec(|_ctx, _params, _input| async { Err::<Value, _>(FlowError::execution("first")) })
        .fallback(|_ctx, _params, _input, _err| async {
            Err::<Value, _>(FlowError::execution("second"))
        })
        .build();

    let err = node.run(&Context::new(), &Params::new()).await.unwrap_err();
    assert_eq!(
        err,
        FlowError::Fallback {
            node: "doomed".to_string(),
            message: "Execution error: second".to_string(),
        }
    );
}

fn doubler(node: crate::lifecycle::NodeBuilder) -> NodeHandle {
    node.prep(|ctx, _params| async move { Ok(ctx.get("items").unwrap_or(Value::Null)) })
        .exec(|_ctx, _params, item| async move {
            sleep(Duration::from_millis(100)).await;
            Ok(json!(item.as_i64().unwrap_or_default() * 2))
        })
        .post(|ctx, _params, _items, results| async move {
            ctx.set("doubled", results);
            Ok(Action::Default)
        })
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_batch_node_runs_items_in_order() {
    let node = doubler(BatchNode::builder("double"));
    let ctx = Context::new();
    ctx.set("items", json!([1, 2, 3]));

    let started = Instant::now();
    node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get("doubled"), Some(json!([2, 4, 6])));
    // one item at a time
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_batch_node_runs_in_waves() {
    let node = doubler(ParallelBatchNode::builder("double", 2));
    let ctx = Context::new();
    ctx.set("items", json!([1, 2, 3, 4, 5]));

    let started = Instant::now();
    node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get("doubled"), Some(json!([2, 4, 6, 8, 10])));
    // ceil(5 / 2) waves
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_batch_items_retry_and_fall_back_independently() {
    let calls = counter();
    let node = ParallelBatchNode::builder("pb", 2)
        .prep(|_ctx, _params| async { Ok(json!([1, -1, 3])) })
        .exec({
            let calls = calls.clone();
            move |_ctx, _params, item| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let n = item.as_i64().unwrap_or_default();
                    if n < 0 {
                        Err(FlowError::execution("negative item"))
                    } else {
                        Ok(json!(n * 2))
                    }
                }
            }
        })
        .fallback(|_ctx, _params, _item, _err| async { Ok(json!("fb")) })
        .post(|ctx, _params, _items, results| async move {
            ctx.set("r", results);
            Ok(Action::Default)
        })
        .max_retries(3)
        .build();

    let ctx = Context::new();
    node.run(&ctx, &Params::new()).await.unwrap();
    // one call each for the good items, three for the failing one
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(ctx.get("r"), Some(json!([2, "fb", 6])));
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_parallel_batch_is_one_wave() {
    let node = doubler(ParallelBatchNode::builder("double", 0));
    let ctx = Context::new();
    ctx.set("items", json!([1, 2, 3, 4, 5, 6]));

    let started = Instant::now();
    node.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get("doubled"), Some(json!([2, 4, 6, 8, 10, 12])));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_batch_prep_must_be_a_sequence() {
    let node = doubler(BatchNode::builder("double"));
    let ctx = Context::new();
    ctx.set("items", json!({"not": "a list"}));
    let err = node.run(&ctx, &Params::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));
}

#[tokio::test]
async fn test_batch_item_failure_discards_results() {
    let node = BatchNode::builder("strict")
        .prep(|_ctx, _params| async { Ok(json!([1, -1, 2])) })
        .exec(|_ctx, _params, item| async move {
            if item.as_i64().unwrap_or_default() < 0 {
                Err(FlowError::execution("negative item"))
            } else {
                Ok(item)
            }
        })
        .post(|ctx, _params, _items, results| async move {
            ctx.set("results", results);
            Ok(Action::Default)
        })
        .build();

    let ctx = Context::new();
    let err = node.run(&ctx, &Params::new()).await.unwrap_err();
    assert_eq!(err, FlowError::execution("negative item"));
    assert!(!ctx.has("results"));
}

#[tokio::test]
async fn test_conditional_runs_matching_branch() {
    let yes = marker("yes", "took_yes");
    let no = marker("no", "took_no");
    let cond = NodeHandle::new(
        "check",
        ConditionalNode::new(
            |ctx, _params| async move { Ok(ctx.get("flag") == Some(json!(true))) },
            &yes,
        )
        .otherwise(&no),
    );

    let ctx = Context::new();
    ctx.set("flag", true);
    assert_eq!(cond.run(&ctx, &Params::new()).await.unwrap(), Action::new("yes"));
    assert!(ctx.has("took_yes"));
    assert!(!ctx.has("took_no"));

    let ctx = Context::new();
    ctx.set("flag", false);
    assert_eq!(cond.run(&ctx, &Params::new()).await.unwrap(), Action::new("no"));
    assert!(ctx.has("took_no"));
    assert!(!ctx.has("took_yes"));
}

#[tokio::test]
async fn test_conditional_without_false_branch_is_noop() {
    let yes = marker("yes", "took_yes");
    let cond = NodeHandle::new(
        "check",
        ConditionalNode::new(|_ctx, _params| async { Ok(false) }, &yes),
    );
    let ctx = Context::new();
    assert_eq!(cond.run(&ctx, &Params::new()).await.unwrap(), Action::Default);
    assert!(ctx.is_empty());
}

fn loop_body(runs: Arc<AtomicUsize>) -> NodeHandle {
    FnNode::builder("body")
        .exec(move |ctx, params, _input| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                // item arrives both as a parameter and in the context
                assert_eq!(params.get("loop_item").cloned(), ctx.get(keys::LOOP_ITEM));
                let item = params.get("loop_item").and_then(Value::as_i64).unwrap_or_default();
                Ok(json!(item * 10))
            }
        })
        .post(|ctx, _params, _prep, result| async move {
            ctx.set(keys::LOOP_RESULT, result);
            Ok(Action::Default)
        })
        .build()
}

#[tokio::test]
async fn test_loop_respects_max_iterations() {
    let runs = counter();
    let body = loop_body(runs.clone());
    let looped = NodeHandle::new(
        "loop",
        LoopNode::new(|_ctx, _params| async { Ok(vec![json!(1), json!(2), json!(3), json!(4)]) }, &body)
            .with_max_iterations(2)
            .with_aggregation(),
    );

    let ctx = Context::new();
    looped.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.get(keys::LOOP_COUNT), Some(json!(2)));
    assert_eq!(ctx.get(keys::LOOP_RESULTS), Some(json!([10, 20])));
    assert!(!ctx.has(keys::LOOP_ITEM));
    assert!(!ctx.has(keys::LOOP_INDEX));
}

#[tokio::test]
async fn test_loop_aggregates_actions_when_body_sets_no_result() {
    let body = FnNode::builder("tag")
        .post(|_ctx, params, _prep, _res| async move {
            let index = params.get("loop_index").and_then(Value::as_u64).unwrap_or_default();
            Ok(Action::new(format!("step-{}", index)))
        })
        .build();
    let looped = NodeHandle::new(
        "loop",
        LoopNode::new(|_ctx, _params| async { Ok(vec![json!("a"), json!("b")]) }, &body)
            .with_aggregation(),
    );

    let ctx = Context::new();
    looped.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get(keys::LOOP_RESULTS), Some(json!(["step-0", "step-1"])));
}

#[tokio::test]
async fn test_loop_clears_item_keys_when_body_fails() {
    let body = FnNode::builder("fails_on_second")
        .exec(|_ctx, params, _input| async move {
            match params.get("loop_index").and_then(Value::as_u64) {
                Some(1) => Err(FlowError::execution("bad item")),
                _ => Ok(Value::Null),
            }
        })
        .build();
    let looped = NodeHandle::new(
        "loop",
        LoopNode::new(|_ctx, _params| async { Ok(vec![json!("a"), json!("b"), json!("c")]) }, &body),
    );

    let ctx = Context::new();
    let err = looped.run(&ctx, &Params::new()).await.unwrap_err();
    assert_eq!(err, FlowError::execution("bad item"));
    assert!(!ctx.has(keys::LOOP_ITEM));
    assert!(!ctx.has(keys::LOOP_INDEX));
    assert!(!ctx.has(keys::LOOP_COUNT));
}

#[tokio::test]
async fn test_loop_with_no_items_never_runs_body() {
    let runs = counter();
    let body = loop_body(runs.clone());
    let looped = NodeHandle::new(
        "loop",
        LoopNode::new(|_ctx, _params| async { Ok(Vec::new()) }, &body).with_aggregation(),
    );

    let ctx = Context::new();
    looped.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.get(keys::LOOP_RESULTS), Some(json!([])));
    assert_eq!(ctx.get(keys::LOOP_COUNT), Some(json!(0)));
}

fn sleeper(name: &'static str, millis: u64) -> NodeHandle {
    FnNode::builder(name)
        .exec(move |ctx, _params, _input| async move {
            ctx.set("started", true);
            sleep(Duration::from_millis(millis)).await;
            ctx.set("finished", true);
            Ok(Value::Null)
        })
        .post(|_ctx, _params, _prep, _res| async { Ok(Action::new("slept")) })
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_slow_node() {
    let slow = sleeper("slow", 200);
    let guarded = NodeHandle::new("guarded", TimeoutNode::new(&slow, Duration::from_millis(50)));

    let ctx = Context::new();
    let err = guarded.run(&ctx, &Params::new()).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(
        err,
        FlowError::Timeout {
            node: "slow".to_string(),
            after: Duration::from_millis(50),
        }
    );
    // writes made before the timer fired stay in place
    assert!(ctx.has("started"));
    assert!(!ctx.has("finished"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_passes_through_fast_node() {
    let fast = sleeper("fast", 10);
    let guarded = NodeHandle::new("guarded", TimeoutNode::new(&fast, Duration::from_millis(50)));
    let action = guarded.run(&Context::new(), &Params::new()).await.unwrap();
    assert_eq!(action, Action::new("slept"));
}

#[tokio::test(start_paused = true)]
async fn test_map_transforms_in_order() {
    let map = NodeHandle::new(
        "map",
        MapNode::new(
            |_ctx, item, index| async move {
                // earlier items take longer
                sleep(Duration::from_millis(100 - index as u64 * 10)).await;
                Ok(json!(format!("{}-{}", index, item.as_str().unwrap_or_default())))
            },
            2,
        ),
    );
    let ctx = Context::new();
    ctx.set(keys::MAP_ITEMS, json!(["a", "b", "c"]));
    map.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get(keys::MAP_RESULTS), Some(json!(["0-a", "1-b", "2-c"])));
}

#[tokio::test]
async fn test_map_with_custom_keys() {
    let map = NodeHandle::new(
        "lengths",
        MapNode::new(
            |_ctx, item, _index| async move {
                Ok(json!(item.as_str().map(str::len).unwrap_or_default()))
            },
            0,
        )
        .with_keys("words", "lengths"),
    );
    let ctx = Context::new();
    ctx.set("words", json!(["one", "three"]));
    map.run(&ctx, &Params::new()).await.unwrap();
    assert_eq!(ctx.get("lengths"), Some(json!([3, 5])));
}

#[tokio::test]
async fn test_map_requires_sequence_input() {
    let map = NodeHandle::new(
        "map",
        MapNode::new(|_ctx, item, _index| async move { Ok(item) }, 0),
    );

    let ctx = Context::new();
    let missing = map.run(&ctx, &Params::new()).await.unwrap_err();
    assert!(matches!(missing, FlowError::Validation(_)));

    ctx.set(keys::MAP_ITEMS, "not a list");
    let wrong_type = map.run(&ctx, &Params::new()).await.unwrap_err();
    assert!(matches!(wrong_type, FlowError::Validation(_)));
}
