use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::action::Action;
use crate::context::Context;
use crate::error::FlowResult;
use crate::node::{Node, NodeHandle};
use crate::params::Params;

type ConditionFn =
    Arc<dyn Fn(Context, Params) -> BoxFuture<'static, FlowResult<bool>> + Send + Sync>;

/// Runs one of two sub-nodes depending on an async predicate.
///
/// The chosen sub-node's action becomes this node's action. When the
/// predicate is false and no false branch is attached, nothing runs and the
/// default action is returned.
#[derive(Clone)]
pub struct ConditionalNode {
    condition: ConditionFn,
    on_true: NodeHandle,
    on_false: Option<NodeHandle>,
}

impl ConditionalNode {
    pub fn new<F, Fut>(condition: F, on_true: &NodeHandle) -> Self
    where
        F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<bool>> + Send + 'static,
    {
        Self {
            condition: Arc::new(
                move |ctx: Context, params: Params| -> BoxFuture<'static, FlowResult<bool>> {
                    Box::pin(condition(ctx, params))
                },
            ),
            on_true: on_true.clone(),
            on_false: None,
        }
    }

    /// Attach the branch taken when the predicate is false.
    pub fn otherwise(mut self, on_false: &NodeHandle) -> Self {
        self.on_false = Some(on_false.clone());
        self
    }
}

#[async_trait]
impl Node for ConditionalNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        let taken = (self.condition)(ctx.clone(), params.clone()).await?;
        let branch = if taken {
            Some(&self.on_true)
        } else {
            self.on_false.as_ref()
        };
        match branch {
            Some(node) => {
                debug!(condition = taken, branch = %node.name(), "running conditional branch");
                node.run(ctx, params).await
            }
            None => {
                debug!(condition = taken, "no branch for condition, skipping");
                Ok(Action::Default)
            }
        }
    }
}

impl Debug for ConditionalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalNode")
            .field("on_true", &self.on_true.name())
            .field("on_false", &self.on_false.as_ref().map(|n| n.name().to_string()))
            .finish()
    }
}
