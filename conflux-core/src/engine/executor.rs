//! Graph Executor
//!
//! Runs a [`Graph`] with dataflow scheduling: a node launches as soon as
//! every predecessor on every incoming edge has completed, so independent
//! branches of different depth overlap in time. There is no layer barrier.
//!
//! # Algorithm
//!
//! 1. Snapshot the topology and every node's adapters. Nothing is read from
//!    the live nodes after this point.
//! 2. Seed the ready queue with the roots.
//! 3. While fewer than `max_concurrency` computations are in flight, pop a
//!    ready node, merge its input and spawn its computation.
//! 4. On completion, record the raw result, decrement each successor's
//!    pending count and queue the ones that reach zero.
//! 5. On the first failure stop launching, cancel or drain the in-flight
//!    siblings according to [`FailurePolicy`], log their outcomes and return
//!    the failure.
//!
//! All counters and results are owned by the coordinating loop; spawned
//! tasks only run the compute call and send back its outcome.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::task::{self, JoinError, JoinSet};
use tracing::Instrument;

use super::compute::Compute;
use super::config::{EngineConfig, FailurePolicy};
use super::result::ResultSet;
use crate::adapter::{apply_all, Adapter};
use crate::error::{GraphError, GraphResult};
use crate::graph::topology::Topology;
use crate::graph::{Graph, NodeId};
use crate::value::{merge_into, ArgMap};

const TRACING_TARGET: &str = "conflux::engine";

/// Executes graphs against one compute collaborator.
#[derive(Clone)]
pub struct Executor {
    compute: Arc<dyn Compute>,
    config: EngineConfig,
}

impl Executor {
    /// Create an executor with the default configuration.
    pub fn new(compute: impl Compute) -> Self {
        Self::with_config(compute, EngineConfig::default())
    }

    pub fn with_config(compute: impl Compute, config: EngineConfig) -> Self {
        Self {
            compute: Arc::new(compute),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `graph` to completion.
    ///
    /// Returns the raw results of every node flagged `output()`, in
    /// completion order. With no flagged node the graph must be a simple
    /// chain, and the result set holds the raw result of its sink.
    pub async fn execute(&self, graph: &Graph) -> GraphResult<ResultSet> {
        let topology = graph.topology();
        let selection = Selection::resolve(&topology)?;
        let started = Instant::now();

        tracing::info!(
            target: TRACING_TARGET,
            nodes = topology.nodes.len(),
            edges = topology.edges.len(),
            max_concurrency = self.config.permits(),
            "Graph run started"
        );

        let run = Run::new(self, topology, graph.shared_initial_args(), selection);
        let outcome = run.drive().await;

        match &outcome {
            Ok(results) => tracing::info!(
                target: TRACING_TARGET,
                results = results.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Graph run completed"
            ),
            Err(err) => tracing::info!(
                target: TRACING_TARGET,
                error = %err,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Graph run failed"
            ),
        }
        outcome
    }
}

/// Which raw results end up in the result set.
enum Selection {
    Flagged(HashSet<NodeId>),
    Sink(NodeId),
}

impl Selection {
    fn resolve(topology: &Topology) -> GraphResult<Self> {
        let flagged: HashSet<NodeId> = topology
            .nodes
            .values()
            .filter(|node| node.is_output())
            .map(|node| node.id())
            .collect();
        if !flagged.is_empty() {
            return Ok(Self::Flagged(flagged));
        }

        let sinks: Vec<NodeId> = topology.sinks().map(|node| node.id()).collect();
        match sinks.as_slice() {
            [sink] if topology.is_chain() => Ok(Self::Sink(*sink)),
            _ => Err(GraphError::UnresolvedOutput { sinks: sinks.len() }),
        }
    }
}

/// Read-only per-node data captured when the run starts.
struct Plan {
    /// Label carried into errors and spans
    name: Option<String>,
    /// Own arguments
    args: ArgMap,
    /// Applied to this node's raw result for each successor
    adapt_to: Vec<Adapter>,
    /// Applied to each predecessor's raw result
    adapt_from: Vec<Adapter>,
}

type TaskOutcome = (NodeId, GraphResult<ArgMap>);

/// State of one in-progress run. Owned by the coordinating loop.
struct Run {
    compute: Arc<dyn Compute>,
    config: EngineConfig,
    /// Graph-wide defaults, lowest precedence
    initial_args: Arc<ArgMap>,
    selection: Selection,
    /// Per-node snapshot taken when the run starts
    plans: HashMap<NodeId, Plan>,
    /// Predecessors of each node, in edge order
    incoming: HashMap<NodeId, Vec<NodeId>>,
    /// Successors of each node, in edge order
    outgoing: HashMap<NodeId, Vec<NodeId>>,
    /// Predecessors each node still waits for
    pending: HashMap<NodeId, usize>,
    /// Raw results of completed nodes
    raw: HashMap<NodeId, ArgMap>,
    /// Nodes whose predecessors have all completed
    ready: VecDeque<NodeId>,
    /// In-flight computations
    tasks: JoinSet<TaskOutcome>,
    /// Node behind each in-flight task
    task_nodes: HashMap<task::Id, NodeId>,
    results: ResultSet,
}

impl Run {
    fn new(
        executor: &Executor,
        topology: Topology,
        initial_args: Arc<ArgMap>,
        selection: Selection,
    ) -> Self {
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (source, dest) in &topology.edges {
            outgoing.entry(*source).or_default().push(*dest);
        }

        let pending = topology
            .nodes
            .keys()
            .map(|id| (*id, topology.predecessors(*id).len()))
            .collect();
        let ready = topology.roots().map(|node| node.id()).collect();

        let plans = topology
            .nodes
            .values()
            .map(|node| {
                let plan = Plan {
                    name: node.name().map(str::to_string),
                    args: node.args().clone(),
                    adapt_to: node.outgoing_adapters(),
                    adapt_from: node.incoming_adapters(),
                };
                (node.id(), plan)
            })
            .collect();

        Self {
            compute: Arc::clone(&executor.compute),
            config: executor.config.clone(),
            initial_args,
            selection,
            plans,
            incoming: topology.incoming,
            outgoing,
            pending,
            raw: HashMap::new(),
            ready,
            tasks: JoinSet::new(),
            task_nodes: HashMap::new(),
            results: ResultSet::default(),
        }
    }

    async fn drive(mut self) -> GraphResult<ResultSet> {
        let permits = self.config.permits();
        let mut failure: Option<GraphError> = None;

        loop {
            while failure.is_none() && self.tasks.len() < permits {
                let Some(id) = self.ready.pop_front() else {
                    break;
                };
                if let Err(err) = self.launch(id) {
                    self.fail(&mut failure, err);
                }
            }

            let Some(joined) = self.tasks.join_next_with_id().await else {
                break;
            };
            let joined = joined.map(|(task, outcome)| {
                self.task_nodes.remove(&task);
                outcome
            });

            match joined {
                Ok((id, Ok(result))) if failure.is_none() => self.complete(id, result),
                Ok((id, Ok(_))) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        node = %id,
                        "Node completed after run failure, result discarded"
                    );
                }
                Ok((_, Err(err))) => self.fail(&mut failure, err),
                Err(join_err) if join_err.is_cancelled() => {
                    self.task_nodes.remove(&join_err.id());
                    tracing::debug!(target: TRACING_TARGET, "In-flight node cancelled");
                }
                Err(join_err) => {
                    let err = self.task_failure(join_err);
                    self.fail(&mut failure, err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if let Selection::Sink(sink) = self.selection {
            if let Some(result) = self.raw.remove(&sink) {
                self.results.push(sink, result);
            }
        }
        Ok(self.results)
    }

    /// Record the first failure and apply the failure policy. Later
    /// failures are logged, not dropped.
    fn fail(&mut self, failure: &mut Option<GraphError>, err: GraphError) {
        if failure.is_some() {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %err,
                "Additional node failure after run failure"
            );
            return;
        }

        tracing::warn!(
            target: TRACING_TARGET,
            error = %err,
            in_flight = self.tasks.len(),
            policy = ?self.config.failure_policy,
            "Node failed, stopping run"
        );
        if self.config.failure_policy == FailurePolicy::Cancel {
            self.tasks.abort_all();
        }
        *failure = Some(err);
    }

    /// Merge the node's input and spawn its computation.
    fn launch(&mut self, id: NodeId) -> GraphResult<()> {
        let merged = self.merged_input(id)?;
        let name = self.plans.get(&id).and_then(|plan| plan.name.clone());

        tracing::debug!(target: TRACING_TARGET, node = %id, "Node launched");

        let compute = Arc::clone(&self.compute);
        let span = tracing::debug_span!(
            target: TRACING_TARGET,
            "node",
            id = %id,
            name = name.as_deref().unwrap_or_default()
        );
        let task = async move {
            let outcome = AssertUnwindSafe(async move { compute.compute(merged).await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(GraphError::from_operation(id, name, err)),
                Err(payload) => Err(GraphError::Panicked {
                    node: id,
                    name,
                    message: panic_message(payload),
                }),
            };
            (id, result)
        };
        let handle = self.tasks.spawn(task.instrument(span));
        self.task_nodes.insert(handle.id(), id);
        Ok(())
    }

    /// Turn a task that died outside its compute call into a node failure.
    fn task_failure(&mut self, join_err: JoinError) -> GraphError {
        tracing::error!(target: TRACING_TARGET, error = %join_err, "Node task aborted");

        let node = self.task_nodes.remove(&join_err.id());
        let message = match join_err.try_into_panic() {
            Ok(payload) => panic_message(payload),
            Err(join_err) => join_err.to_string(),
        };
        match node {
            Some(node) => GraphError::Panicked {
                node,
                name: self.plans.get(&node).and_then(|plan| plan.name.clone()),
                message,
            },
            None => GraphError::TaskAborted { message },
        }
    }

    /// `initial < adapted predecessor outputs (edge order) < own args`.
    fn merged_input(&self, id: NodeId) -> GraphResult<ArgMap> {
        let Some(plan) = self.plans.get(&id) else {
            return Ok(ArgMap::new());
        };
        let strict = self.config.strict_adapters;
        let adapter_error = |source| GraphError::Adapter {
            node: id,
            name: plan.name.clone(),
            source,
        };

        let mut merged = (*self.initial_args).clone();
        let predecessors = self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[]);

        if predecessors.is_empty() {
            let fragment =
                apply_all(&plan.adapt_from, &self.initial_args, strict).map_err(adapter_error)?;
            merge_into(&mut merged, fragment);
        }
        for pred in predecessors {
            let (Some(raw), Some(pred_plan)) = (self.raw.get(pred), self.plans.get(pred)) else {
                continue;
            };
            let adapters = pred_plan.adapt_to.iter().chain(&plan.adapt_from);
            let fragment = apply_all(adapters, raw, strict).map_err(adapter_error)?;
            merge_into(&mut merged, fragment);
        }

        merge_into(&mut merged, plan.args.clone());
        Ok(merged)
    }

    fn complete(&mut self, id: NodeId, result: ArgMap) {
        tracing::debug!(target: TRACING_TARGET, node = %id, "Node completed");

        if let Selection::Flagged(flagged) = &self.selection {
            if flagged.contains(&id) {
                self.results.push(id, result.clone());
            }
        }

        for succ in self.outgoing.get(&id).into_iter().flatten() {
            if let Some(count) = self.pending.get_mut(succ) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.ready.push_back(*succ);
                }
            }
        }
        self.raw.insert(id, result);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
