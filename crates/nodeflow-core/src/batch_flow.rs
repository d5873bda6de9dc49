//! Flows that run their graph once per parameter set.
//!
//! The prep stage yields a sequence of parameter objects. Every sub-run
//! receives the flow's parameters overlaid by one set, passed down the run
//! call chain as an immutable snapshot, so concurrent sub-runs of a
//! [`ParallelBatchFlow`] never see each other's parameters.

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::action::Action;
use crate::batch::expect_items;
use crate::context::Context;
use crate::error::FlowResult;
use crate::lifecycle::{PostFn, PrepFn};
use crate::node::{Node, NodeHandle};
use crate::params::Params;
use crate::waves::{run_ordered, Concurrency};
use crate::workflow::Flow;

#[derive(Clone)]
struct BatchFlowCore {
    flow: Flow,
    prep: Option<PrepFn>,
    post: Option<PostFn>,
}

impl BatchFlowCore {
    fn new(start: &NodeHandle) -> Self {
        Self {
            flow: Flow::new(start),
            prep: None,
            post: None,
        }
    }

    fn set_prep<F, Fut>(&mut self, f: F)
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.prep = Some(Arc::new(
            move |ctx: Context, params: Params| -> BoxFuture<'static, FlowResult<Value>> {
                Box::pin(f(ctx, params))
            },
        ));
    }

    fn set_post<F, Fut>(&mut self, f: F)
    where
        F: Fn(Context, Params, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Action>> + Send + 'static,
    {
        self.post = Some(Arc::new(
            move |ctx: Context,
                  params: Params,
                  sets: Value,
                  actions: Value|
                  -> BoxFuture<'static, FlowResult<Action>> {
                Box::pin(f(ctx, params, sets, actions))
            },
        ));
    }

    async fn run(
        &self,
        concurrency: Concurrency,
        ctx: &Context,
        params: &Params,
    ) -> FlowResult<Action> {
        let name = self.flow.start().name().to_string();
        let prepared = match &self.prep {
            Some(prep) => prep(ctx.clone(), params.clone()).await?,
            None => Value::Array(Vec::new()),
        };
        let raw_sets = expect_items(&name, prepared)?;
        let sets = raw_sets
            .iter()
            .cloned()
            .map(Params::from_object)
            .collect::<FlowResult<Vec<_>>>()?;
        debug!(start_node = %name, sub_runs = sets.len(), ?concurrency, "running batch flow");

        let name = name.as_str();
        let actions = run_ordered(sets, concurrency, |index, set| {
            let scoped = params.merged(&set);
            async move {
                debug!(start_node = %name, index, "starting sub-run");
                self.flow.orchestrate(ctx, &scoped).await
            }
        })
        .await?;

        let actions = Value::Array(actions.iter().map(Action::to_value).collect());
        match &self.post {
            Some(post) => {
                post(ctx.clone(), params.clone(), Value::Array(raw_sets), actions).await
            }
            None => Ok(Action::Default),
        }
    }
}

impl Debug for BatchFlowCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchFlow")
            .field("flow", &self.flow)
            .field("prep", &self.prep.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// Runs the graph once per parameter set, one sub-run after another.
#[derive(Clone, Debug)]
pub struct BatchFlow {
    core: BatchFlowCore,
}

impl BatchFlow {
    pub fn new(start: &NodeHandle) -> Self {
        Self {
            core: BatchFlowCore::new(start),
        }
    }

    /// Batch prep stage: must yield a JSON array of parameter objects.
    pub fn prep<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.core.set_prep(f);
        self
    }

    /// Batch post stage: receives the parameter sets and the action names
    /// each sub-run finished with, and decides the flow's own action.
    pub fn post<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Action>> + Send + 'static,
    {
        self.core.set_post(f);
        self
    }

    pub async fn execute(&self, ctx: &Context) -> FlowResult<Action> {
        self.run(ctx, &Params::new()).await
    }
}

#[async_trait]
impl Node for BatchFlow {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        self.core.run(Concurrency::Sequential, ctx, params).await
    }
}

/// Runs the graph once per parameter set, in waves of at most
/// `max_concurrency` concurrent sub-runs (0 = unlimited).
#[derive(Clone, Debug)]
pub struct ParallelBatchFlow {
    core: BatchFlowCore,
    max_concurrency: usize,
}

impl ParallelBatchFlow {
    pub fn new(start: &NodeHandle, max_concurrency: usize) -> Self {
        Self {
            core: BatchFlowCore::new(start),
            max_concurrency,
        }
    }

    /// Batch prep stage: must yield a JSON array of parameter objects.
    pub fn prep<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.core.set_prep(f);
        self
    }

    pub fn post<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Action>> + Send + 'static,
    {
        self.core.set_post(f);
        self
    }

    pub async fn execute(&self, ctx: &Context) -> FlowResult<Action> {
        self.run(ctx, &Params::new()).await
    }
}

#[async_trait]
impl Node for ParallelBatchFlow {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        self.core
            .run(Concurrency::parallel(self.max_concurrency), ctx, params)
            .await
    }
}
