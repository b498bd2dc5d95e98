//! Execution Engine
//!
//! Executes a [`crate::Graph`] against one injected compute collaborator.
//!
//! # Overview
//!
//! - [`Compute`] is the seam to the embedding application. Each node
//!   invocation calls it once with the node's merged input.
//! - [`OperationRegistry`] is a dispatch table implementation of
//!   [`Compute`] keyed by a discriminator argument.
//! - [`Executor`] owns the collaborator and an [`EngineConfig`] and runs
//!   graphs with dataflow scheduling.
//! - [`ResultSet`] is what a run hands back.
//!
//! # Precedence
//!
//! A node's input is built from three layers, later layers winning:
//! the graph's initial arguments, the adapted raw results of its
//! predecessors (in edge order), and the node's own arguments.

mod compute;
mod config;
mod executor;
mod result;

pub use compute::{
    require, require_f64, Compute, ComputeFuture, OperationRegistry, DEFAULT_DISCRIMINATOR,
};
pub use config::{EngineConfig, FailurePolicy, DEFAULT_MAX_CONCURRENCY};
pub use executor::Executor;
pub use result::ResultSet;
