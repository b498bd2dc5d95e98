//! Graph Topology
//!
//! The [`Graph`] owns the registered roots and the graph-wide initial
//! arguments. Node and edge sets are derived from successor links whenever
//! they are needed, so wiring done after `add_node` is still seen.
//!
//! # Ordering
//!
//! Discovery is deterministic: roots in registration order, then a
//! depth-first pre-order walk over successors. When a node is discovered
//! its outgoing edges are emitted in wiring order. Serialization relies on
//! this to round-trip to an identical document.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;

use super::node::{Node, NodeId};
use crate::engine::{Executor, ResultSet};
use crate::error::GraphResult;
use crate::value::ArgMap;

const TRACING_TARGET: &str = "conflux::graph";

/// A dataflow graph of computation nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    initial_args: Arc<ArgMap>,
    entries: IndexMap<NodeId, Node>,
}

impl Graph {
    /// Create a graph with graph-wide default arguments.
    pub fn new(initial_args: ArgMap) -> Self {
        Self {
            initial_args: Arc::new(initial_args),
            entries: IndexMap::new(),
        }
    }

    /// Lowest-precedence defaults for every node.
    pub fn initial_args(&self) -> &ArgMap {
        &self.initial_args
    }

    pub(crate) fn shared_initial_args(&self) -> Arc<ArgMap> {
        Arc::clone(&self.initial_args)
    }

    /// Register a root and, transitively, everything reachable from it.
    ///
    /// Registering the same node twice is a no-op.
    pub fn add_node(&mut self, root: &Node) -> &mut Self {
        if !self.entries.contains_key(&root.id()) {
            tracing::debug!(target: TRACING_TARGET, node = %root.id(), "Root registered");
            self.entries.insert(root.id(), root.clone());
        }
        self
    }

    /// All reachable nodes in discovery order.
    pub fn nodes(&self) -> Vec<Node> {
        self.topology().nodes.into_values().collect()
    }

    /// All edges as `(source, dest)` pairs in discovery order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.topology().edges
    }

    /// Look up a reachable node by id.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.topology().nodes.shift_remove(&id)
    }

    pub fn node_count(&self) -> usize {
        self.topology().nodes.len()
    }

    /// Nodes with no predecessor.
    pub fn roots(&self) -> Vec<Node> {
        self.topology().roots().cloned().collect()
    }

    /// Nodes with no successor.
    pub fn sinks(&self) -> Vec<Node> {
        self.topology().sinks().cloned().collect()
    }

    /// Predecessors of `id`, in edge order.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.topology().predecessors(id).to_vec()
    }

    /// Whether every node has at most one predecessor and one successor and
    /// there is exactly one sink.
    pub fn is_chain(&self) -> bool {
        self.topology().is_chain()
    }

    /// Node ids ordered so every node follows all of its predecessors.
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.topology().topological_order()
    }

    /// Execute the graph and collect its results.
    ///
    /// See [`Executor::execute`] for scheduling and failure semantics.
    pub async fn run(&self, executor: &Executor) -> GraphResult<ResultSet> {
        executor.execute(self).await
    }

    /// Snapshot of the reachable topology.
    pub(crate) fn topology(&self) -> Topology {
        Topology::collect(self.entries.values())
    }
}

/// Derived node/edge sets for one point in time.
#[derive(Debug, Default)]
pub(crate) struct Topology {
    pub nodes: IndexMap<NodeId, Node>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub incoming: HashMap<NodeId, Vec<NodeId>>,
}

impl Topology {
    fn collect<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let mut topo = Topology::default();
        let mut stack: Vec<Node> = Vec::new();

        for entry in entries {
            stack.push(entry.clone());
            while let Some(node) = stack.pop() {
                if topo.nodes.contains_key(&node.id()) {
                    continue;
                }
                let successors = node.successors();
                for succ in &successors {
                    topo.edges.push((node.id(), succ.id()));
                    topo.incoming.entry(succ.id()).or_default().push(node.id());
                }
                topo.nodes.insert(node.id(), node);
                stack.extend(successors.into_iter().rev());
            }
        }
        topo
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .values()
            .filter(move |n| self.predecessors(n.id()).is_empty())
    }

    pub fn sinks(&self) -> impl Iterator<Item = &Node> {
        let sources: HashSet<NodeId> = self.edges.iter().map(|(s, _)| *s).collect();
        self.nodes
            .values()
            .filter(move |n| !sources.contains(&n.id()))
    }

    pub fn is_chain(&self) -> bool {
        let mut out_degree: HashMap<NodeId, usize> = HashMap::new();
        for (source, _) in &self.edges {
            *out_degree.entry(*source).or_default() += 1;
        }
        let linear = self.nodes.keys().all(|id| {
            self.predecessors(*id).len() <= 1 && out_degree.get(id).copied().unwrap_or(0) <= 1
        });
        linear && self.sinks().count() == 1
    }

    /// Kahn's algorithm over the whole node set.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = self
            .nodes
            .keys()
            .map(|id| (*id, self.predecessors(*id).len()))
            .collect();
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (source, dest) in &self.edges {
            outgoing.entry(*source).or_default().push(*dest);
        }
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for dest in outgoing.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dest) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(*dest);
                    }
                }
            }
        }
        order
    }
}
