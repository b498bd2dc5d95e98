//! Graph Nodes
//!
//! A [`Node`] is a cheap, cloneable handle to one unit of computation. The
//! handle is shared between the graph and every predecessor that pipes into
//! it, so wiring methods take `&self` and return `&Self` for chaining.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::adapter::Adapter;
use crate::error::{GraphError, GraphResult};
use crate::value::ArgMap;

const TRACING_TARGET: &str = "conflux::graph::node";

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Serializes cycle checks with edge insertion across all nodes.
static WIRING_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Process-unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Largest id that can be handed out or restored. `u64::MAX` stays
    /// unused so the counter can always move past a restored id.
    pub const MAX: u64 = u64::MAX - 1;

    /// Generate a new unique node ID.
    ///
    /// # Panics
    ///
    /// Panics once the id space is exhausted rather than wrapping around
    /// onto live ids.
    pub fn new() -> Self {
        match COUNTER.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1)) {
            Ok(id) => Self(id),
            Err(_) => panic!("node id space exhausted"),
        }
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Whether this id can be restored without exhausting the counter.
    pub fn is_reservable(&self) -> bool {
        self.0 <= Self::MAX
    }

    /// Claim an externally supplied ID so freshly generated IDs never
    /// collide with it.
    fn reserve(id: u64) -> Self {
        COUNTER.fetch_max(id.saturating_add(1), Ordering::Relaxed);
        Self(id)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) type AdapterList = SmallVec<[Adapter; 2]>;

/// Wiring state, mutable until the graph runs.
#[derive(Default)]
struct Wiring {
    /// Applied to this node's raw result on every outgoing edge
    adapt_to: AdapterList,
    /// Applied to each predecessor's raw result, or the initial args of a root
    adapt_from: AdapterList,
    /// Whether the raw result is reported in the result set
    output: bool,
    /// Child nodes, in wiring order
    successors: Vec<Node>,
}

struct Inner {
    /// Unique ID
    id: NodeId,
    /// Optional label, independent of the id
    name: Option<String>,
    /// Own arguments, highest precedence when merging
    args: ArgMap,
    /// Adapters, output flag and successor links
    wiring: RwLock<Wiring>,
}

/// A named unit of computation.
///
/// Cloning a `Node` clones the handle, not the node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

impl Node {
    /// Create an unnamed node with its own arguments.
    pub fn new(args: ArgMap) -> Self {
        Self::build(NodeId::new(), None, args)
    }

    /// Create a named node with its own arguments.
    pub fn named(name: impl Into<String>, args: ArgMap) -> Self {
        Self::build(NodeId::new(), Some(name.into()), args)
    }

    fn build(id: NodeId, name: Option<String>, args: ArgMap) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                name,
                args,
                wiring: RwLock::new(Wiring::default()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Own arguments, fixed at construction.
    pub fn args(&self) -> &ArgMap {
        &self.inner.args
    }

    pub fn is_output(&self) -> bool {
        self.inner.wiring.read().output
    }

    /// Snapshot of the successor handles, in wiring order.
    pub fn successors(&self) -> Vec<Node> {
        self.inner.wiring.read().successors.clone()
    }

    /// Adapters applied to this node's raw result for each successor.
    pub fn outgoing_adapters(&self) -> Vec<Adapter> {
        self.inner.wiring.read().adapt_to.to_vec()
    }

    /// Adapters applied to each predecessor's raw result for this node.
    pub fn incoming_adapters(&self) -> Vec<Adapter> {
        self.inner.wiring.read().adapt_from.to_vec()
    }

    /// Add a successor edge from this node to `target`.
    ///
    /// Returns this node, not the target, so calls chain from the source.
    /// An edge that would close a cycle is rejected and nothing changes.
    /// Piping to an existing successor is a no-op.
    pub fn pipe(&self, target: &Node) -> GraphResult<&Self> {
        self.pipe_all([target])
    }

    /// Add successor edges to every target, in order.
    ///
    /// All targets are checked before any edge is added.
    pub fn pipe_all<'a, I>(&self, targets: I) -> GraphResult<&Self>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let targets: Vec<&Node> = targets.into_iter().collect();
        // Held across the check and the insert so two threads wiring
        // opposite edges cannot both pass the cycle check.
        let _guard = WIRING_LOCK.lock();
        for target in &targets {
            if target.reaches(self.id()) {
                return Err(GraphError::Cycle {
                    from: self.id(),
                    to: target.id(),
                });
            }
        }

        let mut wiring = self.inner.wiring.write();
        for target in targets {
            if wiring.successors.iter().any(|s| s.id() == target.id()) {
                continue;
            }
            tracing::debug!(
                target: TRACING_TARGET,
                from = %self.id(),
                to = %target.id(),
                "Edge added"
            );
            wiring.successors.push(target.clone());
        }
        Ok(self)
    }

    /// Register an adapter evaluated against this node's own raw result.
    pub fn adapt_to(&self, adapter: Adapter) -> &Self {
        self.inner.wiring.write().adapt_to.push(adapter);
        self
    }

    /// Register an adapter evaluated against each predecessor's raw result
    /// (or the graph's initial arguments for a root).
    pub fn adapt_from(&self, adapter: Adapter) -> &Self {
        self.inner.wiring.write().adapt_from.push(adapter);
        self
    }

    /// Flag this node's raw result for the result set.
    pub fn output(&self) -> &Self {
        self.inner.wiring.write().output = true;
        self
    }

    /// Whether `target` is this node or reachable from it.
    fn reaches(&self, target: NodeId) -> bool {
        let mut stack = vec![self.clone()];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node.id() == target {
                return true;
            }
            if seen.insert(node.id()) {
                stack.extend(node.successors());
            }
        }
        false
    }

    /// Structural record of this node.
    pub fn to_record(&self) -> NodeRecord {
        let wiring = self.inner.wiring.read();
        NodeRecord {
            id: self.id(),
            name: self.inner.name.clone(),
            args: self.inner.args.clone(),
            adapt_to: wiring.adapt_to.to_vec(),
            adapt_from: wiring.adapt_from.to_vec(),
            output: wiring.output,
            successors: wiring.successors.iter().map(Node::id).collect(),
        }
    }

    /// Rebuild a node from its record, keeping its id.
    ///
    /// Successor links are not restored here; they need the other nodes,
    /// which is the graph's job.
    pub fn from_record(record: NodeRecord) -> Self {
        let node = Self::build(NodeId::reserve(record.id.raw()), record.name, record.args);
        {
            let mut wiring = node.inner.wiring.write();
            wiring.adapt_to = record.adapt_to.into_iter().collect();
            wiring.adapt_from = record.adapt_from.into_iter().collect();
            wiring.output = record.output;
        }
        node
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wiring = self.inner.wiring.read();
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("args", &self.inner.args)
            .field("output", &wiring.output)
            .field(
                "successors",
                &wiring.successors.iter().map(Node::id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Structural form of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: ArgMap,
    #[serde(default)]
    pub adapt_to: Vec<Adapter>,
    #[serde(default)]
    pub adapt_from: Vec<Adapter>,
    #[serde(default)]
    pub output: bool,
    /// Successor ids. Omitted inside a graph document, where edges carry
    /// the topology.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<NodeId>,
}
