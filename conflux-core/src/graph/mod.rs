//! Dataflow Graph
//!
//! This module describes a graph of computations and validates its shape.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are units of computation with their own arguments
//! - Edges are successor links: an edge from A to B means B consumes A's
//!   raw result, reshaped by adapters
//!
//! Cycles are rejected when an edge is wired, never at run time.
//!
//! # Design Decisions
//!
//! 1. Nodes are shared handles. A node is wired by piping from it, and the
//!    same handle can be reached from many predecessors (fan-in).
//!
//! 2. Adapter configuration lives on nodes, not on edges, so the edge set
//!    is just topology and is derived from successor links on demand.
//!
//! 3. Node and edge order is deterministic, which makes structural
//!    documents round-trip exactly.

mod document;
mod node;
pub(crate) mod topology;

pub use document::{EdgeRecord, GraphDocument};
pub use node::{Node, NodeId, NodeRecord};
pub use topology::Graph;
