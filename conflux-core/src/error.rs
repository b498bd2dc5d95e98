//! Error Types
//!
//! Each concern has its own error enum. [`GraphError`] is what wiring and
//! [`crate::Graph::run`] hand back to the caller; it carries the failing
//! node's id and name so a failure can be diagnosed without a graph dump.

use thiserror::Error;

use crate::graph::NodeId;

/// Result alias for graph wiring and execution.
pub type GraphResult<T> = Result<T, GraphError>;

/// A navigation path could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("unexpected '{found}' at offset {offset} in path `{path}`")]
    Unexpected {
        path: String,
        offset: usize,
        found: char,
    },

    #[error("path `{path}` ends unexpectedly")]
    UnexpectedEnd { path: String },

    #[error("invalid list index `{index}` in path `{path}`")]
    InvalidIndex { path: String, index: String },
}

/// An adapter could not produce its fragment.
///
/// Only raised when the engine runs with strict adapters; in lenient mode
/// the same conditions yield an empty fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("missing key `{key}` in adapter source")]
    MissingKey { key: String },

    #[error("adapter has neither a source nor a destination key")]
    NoDestination,
}

/// Failure reported by the external compute collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    #[error("missing required argument `{key}`")]
    MissingArgument { key: String },

    #[error("invalid argument `{key}`: {reason}")]
    InvalidArgument { key: String, reason: String },

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    /// Shorthand for a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A structural document could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("edge references unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} appears more than once")]
    DuplicateNode(NodeId),

    #[error("node id {0} is outside the restorable id range")]
    InvalidNodeId(NodeId),

    #[error("edge {from} -> {to} closes a cycle")]
    CyclicEdge { from: NodeId, to: NodeId },

    #[error("unknown adapter kind `{0}`")]
    UnknownAdapterKind(String),

    #[error("invalid adapter: {0}")]
    InvalidAdapter(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Errors raised while wiring or running a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("no node is flagged as output and the graph is not a simple chain ({sinks} sinks)")]
    UnresolvedOutput { sinks: usize },

    #[error("node {node} ({}) is missing argument `{key}`", label(.name))]
    MissingArgument {
        node: NodeId,
        name: Option<String>,
        key: String,
    },

    #[error("node {node} ({}) failed: {source}", label(.name))]
    Compute {
        node: NodeId,
        name: Option<String>,
        #[source]
        source: OperationError,
    },

    #[error("adapter on node {node} ({}) failed: {source}", label(.name))]
    Adapter {
        node: NodeId,
        name: Option<String>,
        #[source]
        source: AdapterError,
    },

    #[error("node {node} ({}) panicked: {message}", label(.name))]
    Panicked {
        node: NodeId,
        name: Option<String>,
        message: String,
    },

    #[error("node task aborted: {message}")]
    TaskAborted { message: String },

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl GraphError {
    /// Wrap a collaborator failure with the node it came from.
    ///
    /// Missing arguments are lifted into their own variant.
    pub(crate) fn from_operation(node: NodeId, name: Option<String>, err: OperationError) -> Self {
        match err {
            OperationError::MissingArgument { key } => Self::MissingArgument { node, name, key },
            source => Self::Compute { node, name, source },
        }
    }

    /// The node this error is attributed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::MissingArgument { node, .. }
            | Self::Compute { node, .. }
            | Self::Adapter { node, .. }
            | Self::Panicked { node, .. } => Some(*node),
            Self::Cycle { from, .. } => Some(*from),
            Self::UnresolvedOutput { .. } | Self::TaskAborted { .. } | Self::Serialization(_) => {
                None
            }
        }
    }
}

fn label(name: &Option<String>) -> &str {
    name.as_deref().unwrap_or("unnamed")
}
