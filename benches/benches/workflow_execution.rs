use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nodeflow_core::{Action, Context, Flow, FnNode, NodeHandle, ParallelBatchNode, Params};
use serde_json::{json, Value};
use std::time::Duration;

// Node that increments the "counter" context key
fn increment(name: String) -> NodeHandle {
    FnNode::builder(name)
        .prep(|ctx, _params| async move { Ok(ctx.get("counter").unwrap_or(json!(0))) })
        .exec(|_ctx, _params, n| async move { Ok(json!(n.as_u64().unwrap_or_default() + 1)) })
        .post(|ctx, _params, _prep, n| async move {
            ctx.set("counter", n);
            Ok(Action::Default)
        })
        .build()
}

fn linear_chain(len: usize) -> Flow {
    let nodes: Vec<NodeHandle> = (0..len).map(|i| increment(format!("step_{}", i))).collect();
    for pair in nodes.windows(2) {
        pair[0].then(&pair[1]);
    }
    Flow::new(&nodes[0])
}

fn benchmark_linear_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("workflow_execution");
    group.measurement_time(Duration::from_secs(10));
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    for len in [1usize, 10, 100] {
        let flow = linear_chain(len);
        group.bench_with_input(BenchmarkId::new("linear_flow", len), &flow, |b, flow| {
            b.to_async(&runtime).iter(|| async {
                let ctx = Context::new();
                flow.execute(&ctx).await.expect("flow run");
            })
        });
    }

    group.finish();
}

fn benchmark_parallel_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_execution");
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    for max_concurrency in [1usize, 8, 0] {
        let node = ParallelBatchNode::builder("square", max_concurrency)
            .prep(|_ctx, _params| async { Ok(Value::Array((0..256).map(|i| json!(i)).collect())) })
            .exec(|_ctx, _params, item| async move {
                let n = item.as_u64().unwrap_or_default();
                Ok(json!(n * n))
            })
            .build();
        group.bench_with_input(
            BenchmarkId::new("parallel_batch_256", max_concurrency),
            &node,
            |b, node| {
                b.to_async(&runtime).iter(|| async {
                    node.run(&Context::new(), &Params::new())
                        .await
                        .expect("batch run");
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_linear_flow, benchmark_parallel_batch);
criterion_main!(benches);
