//! Pre-built nodes for common control-flow idioms.
//!
//! Every kind here implements [`Node`](crate::node::Node), so it is placed in
//! a graph with [`NodeHandle::new`](crate::node::NodeHandle::new) like any
//! other node.

mod conditional;
mod loop_node;
mod map;
mod timeout;

pub use conditional::ConditionalNode;
pub use loop_node::LoopNode;
pub use map::MapNode;
pub use timeout::TimeoutNode;
