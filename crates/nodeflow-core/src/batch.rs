use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::action::Action;
use crate::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::lifecycle::{NodeBuilder, Stages};
use crate::node::Node;
use crate::params::Params;
use crate::waves::{run_ordered, Concurrency};

/// Unpack a prepared value that must be a sequence of items.
pub(crate) fn expect_items(node: &str, prepared: Value) -> FlowResult<Vec<Value>> {
    match prepared {
        Value::Array(items) => Ok(items),
        other => Err(FlowError::validation(format!(
            "node {} must prepare a sequence of items, got {}",
            node, other
        ))),
    }
}

async fn run_batch(
    stages: &Stages,
    concurrency: Concurrency,
    ctx: &Context,
    params: &Params,
) -> FlowResult<Action> {
    let items = expect_items(stages.name(), stages.prep(ctx, params).await?)?;
    debug!(node = %stages.name(), items = items.len(), ?concurrency, "running batch");
    if let Some(observer) = ctx.observer() {
        observer.metric("batch.items", items.len() as f64, &[("node", stages.name())]);
    }
    let results = run_ordered(items.clone(), concurrency, |_, item| {
        stages.exec(ctx, params, item)
    })
    .await?;
    stages
        .post(ctx, params, Value::Array(items), Value::Array(results))
        .await
}

/// A node whose execute stage runs once per prepared item, in input order.
///
/// Each item gets the full retry/fallback policy on its own. An item that
/// still fails aborts the batch and the error propagates; partial results are
/// discarded.
#[derive(Clone, Debug)]
pub struct BatchNode {
    stages: Stages,
}

impl BatchNode {
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::batch(name.into())
    }

    pub(crate) fn from_stages(stages: Stages) -> Self {
        Self { stages }
    }
}

#[async_trait]
impl Node for BatchNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        run_batch(&self.stages, Concurrency::Sequential, ctx, params).await
    }
}

/// A batch node that executes items concurrently in waves of at most
/// `max_concurrency` items (0 = unlimited).
#[derive(Clone, Debug)]
pub struct ParallelBatchNode {
    stages: Stages,
    max_concurrency: usize,
}

impl ParallelBatchNode {
    pub fn builder(name: impl Into<String>, max_concurrency: usize) -> NodeBuilder {
        NodeBuilder::parallel_batch(name.into(), max_concurrency)
    }

    pub(crate) fn from_stages(stages: Stages, max_concurrency: usize) -> Self {
        Self {
            stages,
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

#[async_trait]
impl Node for ParallelBatchNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        run_batch(
            &self.stages,
            Concurrency::parallel(self.max_concurrency),
            ctx,
            params,
        )
        .await
    }
}
