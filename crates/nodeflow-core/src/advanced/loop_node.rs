use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use crate::action::Action;
use crate::context::{keys, Context};
use crate::error::FlowResult;
use crate::node::{Node, NodeHandle};
use crate::params::Params;

type ItemsFn =
    Arc<dyn Fn(Context, Params) -> BoxFuture<'static, FlowResult<Vec<Value>>> + Send + Sync>;

/// Runs a body node once per produced item.
///
/// The current item and its zero-based index are handed to the body twice:
/// as `loop_item` / `loop_index` parameters and under the
/// [`keys::LOOP_ITEM`] / [`keys::LOOP_INDEX`] context keys, which are removed
/// again once the loop is over or the body fails. After the loop the
/// iteration count is stored under [`keys::LOOP_COUNT`] and the collected
/// results under [`keys::LOOP_RESULTS`] (empty unless aggregation is enabled).
///
/// With aggregation on, each iteration contributes the value the body left in
/// [`keys::LOOP_RESULT`], or the body's action name when it left none.
#[derive(Clone)]
pub struct LoopNode {
    items: ItemsFn,
    body: NodeHandle,
    max_iterations: Option<usize>,
    aggregate: bool,
}

impl LoopNode {
    pub fn new<F, Fut>(items: F, body: &NodeHandle) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Vec<Value>>> + Send + 'static,
    {
        Self {
            items: Arc::new(
                move |ctx: Context, params: Params| -> BoxFuture<'static, FlowResult<Vec<Value>>> {
                    Box::pin(items(ctx, params))
                },
            ),
            body: body.clone(),
            max_iterations: None,
            aggregate: false,
        }
    }

    /// Stop after `max` iterations even when more items were produced.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Collect per-iteration results into [`keys::LOOP_RESULTS`].
    pub fn with_aggregation(mut self) -> Self {
        self.aggregate = true;
        self
    }
}

#[async_trait]
impl Node for LoopNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        let items = (self.items)(ctx.clone(), params.clone()).await?;
        let limit = self
            .max_iterations
            .map_or(items.len(), |max| max.min(items.len()));
        debug!(body = %self.body.name(), items = items.len(), limit, "starting loop");

        let mut results = Vec::new();
        let mut count = 0usize;
        for (index, item) in items.into_iter().take(limit).enumerate() {
            ctx.set(keys::LOOP_ITEM, item.clone());
            ctx.set(keys::LOOP_INDEX, index);
            ctx.remove(keys::LOOP_RESULT);
            let scoped = params.with("loop_item", item).with("loop_index", index);

            let action = match self.body.run(ctx, &scoped).await {
                Ok(action) => action,
                Err(err) => {
                    ctx.remove(keys::LOOP_ITEM);
                    ctx.remove(keys::LOOP_INDEX);
                    return Err(err);
                }
            };
            count += 1;
            if self.aggregate {
                results.push(
                    ctx.remove(keys::LOOP_RESULT)
                        .unwrap_or_else(|| action.to_value()),
                );
            }
        }

        ctx.remove(keys::LOOP_ITEM);
        ctx.remove(keys::LOOP_INDEX);
        ctx.set(keys::LOOP_RESULTS, Value::Array(results));
        ctx.set(keys::LOOP_COUNT, count);
        info!(body = %self.body.name(), iterations = count, "loop finished");
        Ok(Action::Default)
    }
}

impl Debug for LoopNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopNode")
            .field("body", &self.body.name())
            .field("max_iterations", &self.max_iterations)
            .field("aggregate", &self.aggregate)
            .finish()
    }
}
