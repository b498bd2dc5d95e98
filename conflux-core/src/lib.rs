//! Conflux Core
//!
//! This crate provides a dataflow execution graph: a DAG of computation
//! nodes, connected by data-shaping adapters, executed with node-level
//! concurrency and selective result collection.
//!
//! It implements:
//!
//! - Adapters that reshape values across edges whose producer and consumer
//!   disagree on key names and value shapes
//! - Nodes and graphs with cycle rejection at wiring time
//! - A dataflow executor that runs independent branches concurrently
//! - Structural (de)serialization of graphs to JSON and MessagePack
//!
//! What a node actually computes is supplied by the embedding application
//! through the [`Compute`] trait.
//!
//! # Architecture
//!
//! - `value`: argument maps and merging
//! - `adapter`: edge transforms and path navigation
//! - `graph`: nodes, topology and structural documents
//! - `engine`: compute seam, configuration, executor and result sets
//!
//! # Example
//!
//! ```rust
//! use conflux_core::{Adapter, Executor, Graph, Node, OperationRegistry};
//! use conflux_core::engine::require_f64;
//! use conflux_core::value::args;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ops = OperationRegistry::new();
//! ops.register_fn("add", |a| {
//!     let sum = require_f64(a, "x")? + require_f64(a, "y")?;
//!     Ok(args([("sum", json!(sum))]))
//! });
//!
//! let add = Node::named("add", args([("op", json!("add")), ("x", json!(1))]));
//! let again = Node::named("again", args([("op", json!("add")), ("x", json!(10))]));
//! add.adapt_to(Adapter::rename("sum", "y"));
//! add.pipe(&again)?;
//!
//! let mut graph = Graph::new(args([("y", json!(2))]));
//! graph.add_node(&add);
//!
//! let results = graph.run(&Executor::new(ops)).await?;
//! assert_eq!(results.first().unwrap()["sum"], json!(13.0));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod engine;
pub mod error;
pub mod graph;
pub mod value;

pub use crate::adapter::{Adapter, AdapterKind, Path, PathStep};
pub use crate::engine::{
    Compute, EngineConfig, Executor, FailurePolicy, OperationRegistry, ResultSet,
};
pub use crate::error::{
    AdapterError, GraphError, GraphResult, OperationError, PathError, SerializationError,
};
pub use crate::graph::{EdgeRecord, Graph, GraphDocument, Node, NodeId, NodeRecord};
pub use crate::value::{ArgMap, Value};
