//! Closure-backed prepare → execute → post nodes.
//!
//! [`FnNode::builder`] assembles a node from optional async closures. The
//! same [`Stages`] drive the batch node kinds, which run the execute stage
//! once per prepared item.

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::action::Action;
use crate::batch::{BatchNode, ParallelBatchNode};
use crate::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::node::{Node, NodeHandle};
use crate::params::Params;
use crate::retry::RetryPolicy;

pub type PrepFn = Arc<dyn Fn(Context, Params) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync>;
pub type ExecFn =
    Arc<dyn Fn(Context, Params, Value) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync>;
pub type FallbackFn = Arc<
    dyn Fn(Context, Params, Value, FlowError) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync,
>;
pub type PostFn = Arc<
    dyn Fn(Context, Params, Value, Value) -> BoxFuture<'static, FlowResult<Action>> + Send + Sync,
>;

/// The callback stages and retry policy shared by closure-backed nodes.
#[derive(Clone)]
pub struct Stages {
    pub(crate) name: String,
    prep: Option<PrepFn>,
    exec: Option<ExecFn>,
    fallback: Option<FallbackFn>,
    post: Option<PostFn>,
    pub(crate) retry: RetryPolicy,
}

impl Stages {
    fn new(name: String) -> Self {
        Self {
            name,
            prep: None,
            exec: None,
            fallback: None,
            post: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prepare stage; an absent callback yields `Value::Null`.
    pub async fn prep(&self, ctx: &Context, params: &Params) -> FlowResult<Value> {
        match &self.prep {
            Some(prep) => prep(ctx.clone(), params.clone()).await,
            None => Ok(Value::Null),
        }
    }

    /// Execute stage with retry and fallback applied to one input.
    ///
    /// Attempts run strictly one after another. The wait only happens
    /// between attempts. Once attempts are exhausted the fallback, if any,
    /// supplies the result; a fallback failure is never retried.
    pub async fn exec(&self, ctx: &Context, params: &Params, input: Value) -> FlowResult<Value> {
        let exec = match &self.exec {
            Some(exec) => exec,
            None => return Ok(Value::Null),
        };
        let max_attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            debug!(node = %self.name, attempt, max_attempts, "executing");
            match exec(ctx.clone(), params.clone(), input.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if self.retry.should_retry(attempt) => {
                    let wait = self.retry.backoff_duration(attempt);
                    warn!(node = %self.name, attempt, error = %err, wait = ?wait, "execute failed, retrying");
                    if let Some(observer) = ctx.observer() {
                        observer.metric("node.retry", 1.0, &[("node", self.name.as_str())]);
                    }
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return match &self.fallback {
                        Some(fallback) => {
                            warn!(node = %self.name, attempt, error = %err, "retries exhausted, using fallback");
                            fallback(ctx.clone(), params.clone(), input, err)
                                .await
                                .map_err(|fallback_err| {
                                    error!(node = %self.name, error = %fallback_err, "fallback failed");
                                    FlowError::Fallback {
                                        node: self.name.clone(),
                                        message: fallback_err.to_string(),
                                    }
                                })
                        }
                        None => {
                            error!(node = %self.name, attempt, error = %err, "retries exhausted");
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Post stage; an absent callback routes on the default action.
    pub async fn post(
        &self,
        ctx: &Context,
        params: &Params,
        prepared: Value,
        result: Value,
    ) -> FlowResult<Action> {
        match &self.post {
            Some(post) => post(ctx.clone(), params.clone(), prepared, result).await,
            None => Ok(Action::Default),
        }
    }
}

impl Debug for Stages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stages")
            .field("name", &self.name)
            .field("prep", &self.prep.is_some())
            .field("exec", &self.exec.is_some())
            .field("fallback", &self.fallback.is_some())
            .field("post", &self.post.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

/// A plain node built from closures.
#[derive(Clone, Debug)]
pub struct FnNode {
    stages: Stages,
}

impl FnNode {
    /// Start building a plain node.
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name.into(), Kind::Single)
    }
}

#[async_trait]
impl Node for FnNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        let prepared = self.stages.prep(ctx, params).await?;
        let result = self.stages.exec(ctx, params, prepared.clone()).await?;
        self.stages.post(ctx, params, prepared, result).await
    }
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Single,
    Batch,
    ParallelBatch(usize),
}

/// Builder for closure-backed nodes.
///
/// Every stage is optional. Closures receive owned clones of the context
/// handle and the parameter snapshot so their futures can be `'static`.
#[must_use = "call `build` to obtain the node handle"]
pub struct NodeBuilder {
    stages: Stages,
    kind: Kind,
}

impl NodeBuilder {
    fn new(name: String, kind: Kind) -> Self {
        Self {
            stages: Stages::new(name),
            kind,
        }
    }

    pub(crate) fn batch(name: String) -> Self {
        Self::new(name, Kind::Batch)
    }

    pub(crate) fn parallel_batch(name: String, max_concurrency: usize) -> Self {
        Self::new(name, Kind::ParallelBatch(max_concurrency))
    }

    pub fn prep<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.stages.prep = Some(Arc::new(
            move |ctx: Context, params: Params| -> BoxFuture<'static, FlowResult<Value>> {
                Box::pin(f(ctx, params))
            },
        ));
        self
    }

    /// Execute stage. For batch nodes it receives one item at a time.
    pub fn exec<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.stages.exec = Some(Arc::new(
            move |ctx: Context, params: Params, input: Value| -> BoxFuture<'static, FlowResult<Value>> {
                Box::pin(f(ctx, params, input))
            },
        ));
        self
    }

    /// Fallback invoked once with the last error after retries are exhausted.
    pub fn fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params, Value, FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        self.stages.fallback = Some(Arc::new(
            move |ctx: Context,
                  params: Params,
                  input: Value,
                  err: FlowError|
                  -> BoxFuture<'static, FlowResult<Value>> {
                Box::pin(f(ctx, params, input, err))
            },
        ));
        self
    }

    pub fn post<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Params, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Action>> + Send + 'static,
    {
        self.stages.post = Some(Arc::new(
            move |ctx: Context,
                  params: Params,
                  prepared: Value,
                  result: Value|
                  -> BoxFuture<'static, FlowResult<Action>> {
                Box::pin(f(ctx, params, prepared, result))
            },
        ));
        self
    }

    /// Maximum number of execute attempts (minimum 1).
    pub fn max_retries(mut self, max_attempts: usize) -> Self {
        self.stages.retry.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait between attempts.
    pub fn wait(mut self, wait: Duration) -> Self {
        self.stages.retry.wait = wait;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.stages.retry = policy;
        self
    }

    /// Finish the node and place it in a graph.
    pub fn build(self) -> NodeHandle {
        let name = self.stages.name.clone();
        match self.kind {
            Kind::Single => NodeHandle::new(name, FnNode { stages: self.stages }),
            Kind::Batch => NodeHandle::new(name, BatchNode::from_stages(self.stages)),
            Kind::ParallelBatch(max) => {
                NodeHandle::new(name, ParallelBatchNode::from_stages(self.stages, max))
            }
        }
    }
}
