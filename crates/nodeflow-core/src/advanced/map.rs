use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::action::Action;
use crate::context::{keys, Context};
use crate::error::{FlowError, FlowResult};
use crate::node::Node;
use crate::params::Params;
use crate::waves::{run_ordered, Concurrency};

type TransformFn =
    Arc<dyn Fn(Context, Value, usize) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync>;

/// Transforms every item of a context sequence in concurrent waves.
///
/// Items are read from `input_key` ([`keys::MAP_ITEMS`] by default) and the
/// ordered results are written to `output_key` ([`keys::MAP_RESULTS`]).
#[derive(Clone)]
pub struct MapNode {
    transform: TransformFn,
    max_concurrency: usize,
    input_key: String,
    output_key: String,
}

impl MapNode {
    /// `max_concurrency` of 0 runs all items in one wave.
    pub fn new<F, Fut>(transform: F, max_concurrency: usize) -> Self
    where
        F: Fn(Context, Value, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Value>> + Send + 'static,
    {
        Self {
            transform: Arc::new(
                move |ctx: Context, item: Value, index: usize| -> BoxFuture<'static, FlowResult<Value>> {
                    Box::pin(transform(ctx, item, index))
                },
            ),
            max_concurrency,
            input_key: keys::MAP_ITEMS.to_string(),
            output_key: keys::MAP_RESULTS.to_string(),
        }
    }

    pub fn with_keys(mut self, input_key: impl Into<String>, output_key: impl Into<String>) -> Self {
        self.input_key = input_key.into();
        self.output_key = output_key.into();
        self
    }
}

#[async_trait]
impl Node for MapNode {
    async fn run(&self, ctx: &Context, _params: &Params) -> FlowResult<Action> {
        let items = match ctx.get(&self.input_key) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(FlowError::validation(format!(
                    "map input {} must be a sequence, got {}",
                    self.input_key, other
                )))
            }
            None => {
                return Err(FlowError::validation(format!(
                    "map input {} is missing from the context",
                    self.input_key
                )))
            }
        };
        debug!(input = %self.input_key, items = items.len(), max_concurrency = self.max_concurrency, "mapping items");

        let results = run_ordered(
            items,
            Concurrency::parallel(self.max_concurrency),
            |index, item| (self.transform)(ctx.clone(), item, index),
        )
        .await?;
        ctx.set(self.output_key.clone(), Value::Array(results));
        Ok(Action::Default)
    }
}

impl Debug for MapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNode")
            .field("max_concurrency", &self.max_concurrency)
            .field("input_key", &self.input_key)
            .field("output_key", &self.output_key)
            .finish()
    }
}
