use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::node::{Node, NodeHandle};
use crate::params::Params;

/// A node whose body drives a graph of nodes to completion.
///
/// Starting at the entry node, the flow runs each node, resolves the
/// successor for the returned action (falling back to the default edge) and
/// stops when no successor exists. The last action becomes the flow's own
/// action, so a flow can be placed in an outer graph like any other node.
#[derive(Clone, Debug)]
pub struct Flow {
    start: NodeHandle,
    max_steps: Option<usize>,
}

impl Flow {
    /// Create a new flow with the given start node
    pub fn new(start: &NodeHandle) -> Self {
        Self {
            start: start.clone(),
            max_steps: None,
        }
    }

    /// Fail with [`FlowError::StepLimit`] once more than `max_steps` node
    /// runs happen in one orchestration. Unlimited by default, since cycles
    /// are legal.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn start(&self) -> &NodeHandle {
        &self.start
    }

    /// Run the flow at the top level with no inherited parameters.
    pub async fn execute(&self, ctx: &Context) -> FlowResult<Action> {
        self.execute_with(ctx, &Params::new()).await
    }

    /// Run the flow at the top level with the given parameters.
    pub async fn execute_with(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        info!(start_node = %self.start.name(), "Starting flow execution");
        let action = self.orchestrate(ctx, params).await?;
        info!(start_node = %self.start.name(), action = %action, "Flow execution completed");
        Ok(action)
    }

    /// Walk the graph from the entry node, passing `params` to every node.
    pub(crate) async fn orchestrate(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        let mut current = Some(self.start.clone());
        let mut last = Action::Default;
        let mut steps = 0usize;

        while let Some(node) = current {
            steps += 1;
            if let Some(limit) = self.max_steps {
                if steps > limit {
                    warn!(node = %node.name(), limit, "Flow step limit exceeded");
                    return Err(FlowError::StepLimit(limit));
                }
            }

            last = node.run(ctx, params).await?;
            current = node.successor(&last);

            match &current {
                Some(next) => {
                    debug!(node = %node.name(), action = %last, next_node = %next.name(), "Following edge")
                }
                None if node.has_successors() => {
                    let available: Vec<String> = node
                        .successor_actions()
                        .iter()
                        .map(|a| a.name().to_string())
                        .collect();
                    warn!(
                        node = %node.name(),
                        action = %last,
                        ?available,
                        "Flow ends: no edge for action"
                    );
                }
                None => debug!(node = %node.name(), action = %last, "Flow reached terminal node"),
            }
        }

        Ok(last)
    }
}

#[async_trait]
impl Node for Flow {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        self.orchestrate(ctx, params).await
    }
}
