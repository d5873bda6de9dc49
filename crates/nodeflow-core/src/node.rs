use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::action::Action;
use crate::context::Context;
use crate::error::FlowResult;
use crate::params::Params;

/// Unique identifier for a node in a graph
pub type NodeId = String;

/// Core trait that all graph nodes implement.
///
/// A node runs against the shared [`Context`] with an execution-scoped
/// [`Params`] snapshot and yields the [`Action`] an enclosing flow uses to
/// pick the next node. Flows implement this trait too, which is what makes
/// them nestable.
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node's full lifecycle.
    async fn run(&self, ctx: &Context, params: &Params) -> FlowResult<Action>;
}

struct Vertex {
    id: NodeId,
    name: String,
    node: Box<dyn Node>,
    params: RwLock<Params>,
    successors: RwLock<HashMap<Action, NodeHandle>>,
}

/// Shared handle to a node placed in a graph.
///
/// The handle owns the node's successor table. Edges are forward-only, and
/// cyclic graphs are legal; call [`NodeHandle::clear_successors`] to break a
/// cycle when a looping graph is torn down.
#[derive(Clone)]
pub struct NodeHandle {
    vertex: Arc<Vertex>,
}

impl NodeHandle {
    /// Place `node` in a graph under a human readable name.
    pub fn new(name: impl Into<String>, node: impl Node + 'static) -> Self {
        Self {
            vertex: Arc::new(Vertex {
                id: Uuid::new_v4().to_string(),
                name: name.into(),
                node: Box::new(node),
                params: RwLock::new(Params::new()),
                successors: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.vertex.id.clone()
    }

    pub fn name(&self) -> &str {
        &self.vertex.name
    }

    /// Base parameters set by the caller.
    pub fn params(&self) -> Params {
        self.vertex
            .params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the caller-set base parameters. Parameters inherited from an
    /// enclosing flow are layered on top of these at run time.
    pub fn set_params(&self, params: impl Into<Params>) -> &Self {
        *self
            .vertex
            .params
            .write()
            .unwrap_or_else(PoisonError::into_inner) = params.into();
        self
    }

    /// Install (or overwrite) the edge for `action`.
    pub fn add_successor(&self, action: impl Into<Action>, next: &NodeHandle) -> &Self {
        let action = action.into();
        let mut successors = self
            .vertex
            .successors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if successors.contains_key(&action) {
            debug!(node = %self.name(), action = %action, "overwriting successor");
        }
        successors.insert(action, next.clone());
        self
    }

    /// Link `next` on the default edge and return `next`, so that
    /// `a.then(&b).then(&c)` builds `a -> b -> c`.
    pub fn then(&self, next: &NodeHandle) -> NodeHandle {
        self.add_successor(Action::Default, next);
        next.clone()
    }

    /// Start an action-scoped edge: `a.on("retry").then(&b)` installs
    /// `a --retry--> b` and returns `a`.
    pub fn on(&self, action: impl Into<Action>) -> Branch<'_> {
        Branch {
            from: self,
            action: action.into(),
        }
    }

    /// Resolve the successor for `action`, falling back to the default edge.
    pub fn successor(&self, action: &Action) -> Option<NodeHandle> {
        let successors = self
            .vertex
            .successors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        successors
            .get(action)
            .or_else(|| successors.get(&Action::Default))
            .cloned()
    }

    /// Actions that have an edge out of this node.
    pub fn successor_actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .vertex
            .successors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.name().cmp(b.name()));
        actions
    }

    pub fn has_successors(&self) -> bool {
        !self
            .vertex
            .successors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Drop every outgoing edge.
    pub fn clear_successors(&self) {
        self.vertex
            .successors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Run the node with its base parameters overlaid by `inherited`.
    pub async fn run(&self, ctx: &Context, inherited: &Params) -> FlowResult<Action> {
        let params = self.params().merged(inherited);
        let started = Instant::now();
        debug!(node = %self.name(), "running node");
        let result = self.vertex.node.run(ctx, &params).await;
        if let Some(observer) = ctx.observer() {
            let (outcome, action) = match &result {
                Ok(action) => ("ok", action.name().to_string()),
                Err(_) => ("error", String::new()),
            };
            observer.span(
                "node.run",
                started.elapsed(),
                &[("node", self.name()), ("outcome", outcome), ("action", action.as_str())],
            );
        }
        result
    }

    /// True when both handles refer to the same graph node.
    pub fn ptr_eq(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.vertex, &other.vertex)
    }
}

impl Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.vertex.id)
            .field("name", &self.vertex.name)
            .field("successors", &self.successor_actions())
            .finish()
    }
}

/// Pending action-scoped edge created by [`NodeHandle::on`].
#[must_use = "a branch does nothing until it is linked with `then`"]
pub struct Branch<'a> {
    from: &'a NodeHandle,
    action: Action,
}

impl<'a> Branch<'a> {
    /// Install the edge and return the source node for further branching.
    pub fn then(self, next: &NodeHandle) -> &'a NodeHandle {
        self.from.add_successor(self.action, next)
    }
}
