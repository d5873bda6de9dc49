//! # Nodeflow - an in-process workflow graph engine
//!
//! Nodes read and write a shared [`Context`], return an [`Action`], and the
//! enclosing [`Flow`] follows the edge registered for that action. Batch nodes
//! and batch flows fan work out one item at a time or in bounded concurrent
//! waves.
//!
//! ## Features
//!
//! - Core functionality is always included
//! - `llm`: LLM client, response cache, usage accounting and retrieval helpers
//! - `full`: Enables all features
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! nodeflow = { version = "0.1", features = ["llm"] }
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging with default settings.
///
/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back
/// to `info`. Calling it again after a subscriber is installed does nothing.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

// Re-export the core crate (always included)
pub use nodeflow_core as core;

pub use nodeflow_core::{
    Action, BatchFlow, BatchNode, ConditionalNode, Context, FlowError, FlowResult, Flow, FnNode,
    LoopNode, MapNode, Node, NodeHandle, ParallelBatchFlow, ParallelBatchNode, Params,
    RetryPolicy, Snapshot, TimeoutNode,
};

// Re-export the LLM crate
#[cfg(feature = "llm")]
pub use nodeflow_llm as llm;
