//! Structural Documents
//!
//! A [`GraphDocument`] is the at-rest form of a graph: initial arguments,
//! node records and `[source, dest, {}]` edge triples. Adapter
//! configuration lives on the node records; edges carry topology only.
//! Documents encode as JSON or MessagePack.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId, NodeRecord};
use super::topology::Graph;
use crate::error::SerializationError;
use crate::value::ArgMap;

const TRACING_TARGET: &str = "conflux::graph::document";

/// An edge triple. The third element is reserved edge data, always empty
/// when written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord(pub NodeId, pub NodeId, pub ArgMap);

impl EdgeRecord {
    pub fn new(source: NodeId, dest: NodeId) -> Self {
        Self(source, dest, ArgMap::new())
    }
}

/// Structural form of a whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDocument {
    pub initial_args: ArgMap,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Graph {
    /// Structural snapshot of this graph.
    pub fn to_document(&self) -> GraphDocument {
        let topology = self.topology();
        let nodes = topology
            .nodes
            .values()
            .map(|node| NodeRecord {
                successors: Vec::new(),
                ..node.to_record()
            })
            .collect();
        let edges = topology
            .edges
            .iter()
            .map(|(source, dest)| EdgeRecord::new(*source, *dest))
            .collect();

        GraphDocument {
            initial_args: self.initial_args().clone(),
            nodes,
            edges,
        }
    }

    /// Rebuild a graph from a document, keeping node ids.
    ///
    /// Edges are wired in document order. Successor ids found on node
    /// records are wired afterwards; duplicates of document edges are
    /// ignored.
    pub fn from_document(doc: GraphDocument) -> Result<Self, SerializationError> {
        let mut nodes: IndexMap<NodeId, Node> = IndexMap::with_capacity(doc.nodes.len());
        let mut extra_edges = Vec::new();

        for record in doc.nodes {
            let id = record.id;
            if !id.is_reservable() {
                return Err(SerializationError::InvalidNodeId(id));
            }
            if nodes.contains_key(&id) {
                return Err(SerializationError::DuplicateNode(id));
            }
            extra_edges.extend(record.successors.iter().map(|dest| (id, *dest)));
            nodes.insert(id, Node::from_record(record));
        }

        let wired = doc
            .edges
            .iter()
            .map(|EdgeRecord(source, dest, _)| (*source, *dest))
            .chain(extra_edges);
        for (source, dest) in wired {
            let from = nodes
                .get(&source)
                .ok_or(SerializationError::UnknownNode(source))?;
            let to = nodes
                .get(&dest)
                .ok_or(SerializationError::UnknownNode(dest))?;
            from.pipe(to).map_err(|_| SerializationError::CyclicEdge {
                from: source,
                to: dest,
            })?;
        }

        // Registering every node in document order reproduces the original
        // discovery order.
        let mut graph = Graph::new(doc.initial_args);
        for node in nodes.values() {
            graph.add_node(node);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            nodes = graph.node_count(),
            "Graph restored from document"
        );
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.to_document())?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        Self::from_document(serde_json::from_str(json)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(rmp_serde::to_vec_named(&self.to_document())?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SerializationError> {
        Self::from_document(rmp_serde::from_slice(bytes)?)
    }
}
