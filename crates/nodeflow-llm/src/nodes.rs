//! Ready-made graph nodes backed by an [`LlmClient`].

use std::sync::Arc;

use nodeflow_core::{Action, FlowError, FnNode, NodeBuilder};
use serde_json::Value;

use crate::client::LlmClient;

/// A node that completes the prompt stored under `prompt_key` and writes the
/// answer to `output_key`.
///
/// The returned builder can be given a retry policy or fallback before
/// `build()`; provider failures surface as [`FlowError::Provider`].
pub fn completion_node(
    name: impl Into<String>,
    client: Arc<dyn LlmClient>,
    prompt_key: impl Into<String>,
    output_key: impl Into<String>,
) -> NodeBuilder {
    let prompt_key = prompt_key.into();
    let output_key = output_key.into();
    FnNode::builder(name)
        .prep(move |ctx, _params| {
            let prompt = ctx.get(&prompt_key);
            let prompt_key = prompt_key.clone();
            async move {
                match prompt {
                    Some(Value::String(prompt)) => Ok(Value::String(prompt)),
                    Some(other) => Err(FlowError::validation(format!(
                        "prompt {} must be a string, got {}",
                        prompt_key, other
                    ))),
                    None => Err(FlowError::validation(format!(
                        "prompt {} is missing from the context",
                        prompt_key
                    ))),
                }
            }
        })
        .exec(move |_ctx, _params, prompt| {
            let client = client.clone();
            async move {
                let prompt = prompt.as_str().unwrap_or_default();
                client
                    .complete(prompt)
                    .await
                    .map(Value::String)
                    .map_err(FlowError::from)
            }
        })
        .post(move |ctx, _params, _prompt, answer| {
            let output_key = output_key.clone();
            async move {
                ctx.set(output_key, answer);
                Ok(Action::Default)
            }
        })
}
