use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::action::Action;
use crate::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::node::{Node, NodeHandle};
use crate::params::Params;

/// Races a node's run against a timer.
///
/// When the timer wins the inner run is dropped at its current await point.
/// Context writes it already made stay in place.
#[derive(Clone, Debug)]
pub struct TimeoutNode {
    inner: NodeHandle,
    after: Duration,
}

impl TimeoutNode {
    pub fn new(inner: &NodeHandle, after: Duration) -> Self {
        Self {
            inner: inner.clone(),
            after,
        }
    }

    pub fn duration(&self) -> Duration {
        self.after
    }
}

#[async_trait]
impl Node for TimeoutNode {
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action> {
        tokio::select! {
            result = self.inner.run(ctx, params) => result,
            _ = sleep(self.after) => {
                warn!(node = %self.inner.name(), after = ?self.after, "node timed out");
                Err(FlowError::Timeout {
                    node: self.inner.name().to_string(),
                    after: self.after,
                })
            }
        }
    }
}
