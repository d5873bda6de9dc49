//! Core execution engine of nodeflow.
//!
//! Nodes run against a shared [`Context`] and an immutable [`Params`]
//! snapshot, and return an [`Action`] that the enclosing [`Flow`] uses to pick
//! the next node. Batch constructs fan work out sequentially or in bounded
//! concurrent waves.

pub mod action;
pub mod advanced;
pub mod batch;
pub mod batch_flow;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod node;
pub mod observe;
pub mod params;
pub mod retry;
pub mod waves;
pub mod workflow;

pub use action::Action;
pub use advanced::{ConditionalNode, LoopNode, MapNode, TimeoutNode};
pub use batch::{BatchNode, ParallelBatchNode};
pub use batch_flow::{BatchFlow, ParallelBatchFlow};
pub use checkpoint::{
    CheckpointError, FileSnapshotStore, InMemorySnapshotStore, Snapshot, SnapshotStore,
};
pub use context::{keys, Context};
pub use error::{FlowError, FlowResult};
pub use lifecycle::{FnNode, NodeBuilder};
pub use node::{Node, NodeHandle, NodeId};
pub use observe::{MemoryObserver, Observer, Record, TracingObserver};
pub use params::Params;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use waves::Concurrency;
pub use workflow::Flow;

#[cfg(test)]
mod tests;
