//! Integration Tests for Graph Execution
//!
//! These tests wire graphs through the public API and run them against
//! small compute collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conflux_core::engine::require;
use conflux_core::value::args;
use conflux_core::{
    Adapter, ArgMap, EngineConfig, Executor, FailurePolicy, Graph, GraphError, Node,
    OperationError, OperationRegistry,
};
use serde_json::json;

fn int(a: &ArgMap, key: &str) -> Result<i64, OperationError> {
    require(a, key)?
        .as_i64()
        .ok_or_else(|| OperationError::InvalidArgument {
            key: key.to_string(),
            reason: "expected an integer".to_string(),
        })
}

/// `+` and `×` over integer `x` and `y`.
fn arithmetic() -> OperationRegistry {
    let mut ops = OperationRegistry::new();
    ops.register_fn("add", |a| Ok(args([("sum", json!(int(a, "x")? + int(a, "y")?))])));
    ops.register_fn("mult", |a| {
        Ok(args([("product", json!(int(a, "x")? * int(a, "y")?))]))
    });
    ops
}

/// Returns its merged input unchanged.
fn echo() -> Executor {
    Executor::new(|a: ArgMap| async move { Ok::<_, OperationError>(a) })
}

fn op(name: &str, x: i64) -> ArgMap {
    args([("op", json!(name)), ("x", json!(x))])
}

/// add(x=1) -> mult(x=2) -> mult(x=`last_x`), with `sum -> y` and
/// `product -> y` adapters.
fn scenario(last_x: i64) -> (Graph, Node, Node, Node) {
    let add = Node::named("add", op("add", 1));
    let mult1 = Node::named("mult1", op("mult", 2));
    let mult2 = Node::named("mult2", op("mult", last_x));

    add.adapt_to(Adapter::rename("sum", "y"));
    mult1.adapt_to(Adapter::rename("product", "y"));
    add.pipe(&mult1).unwrap();
    mult1.pipe(&mult2).unwrap();

    let mut graph = Graph::new(args([("y", json!(2))]));
    graph.add_node(&add);
    (graph, add, mult1, mult2)
}

/// Scenario A: the default output of a chain is the sink's raw result.
#[tokio::test]
async fn chain_default_output_is_sink() {
    let (graph, _, _, _) = scenario(6);
    let results = graph.run(&Executor::new(arithmetic())).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.first(), Some(&args([("product", json!(36))])));
}

/// Scenario A, every node flagged: raw results per node.
#[tokio::test]
async fn raw_results_per_node() {
    let (graph, add, mult1, mult2) = scenario(6);
    add.output();
    mult1.output();
    mult2.output();

    let results = graph.run(&Executor::new(arithmetic())).await.unwrap();
    assert_eq!(results.get(add.id()), Some(&args([("sum", json!(3))])));
    assert_eq!(results.get(mult1.id()), Some(&args([("product", json!(6))])));
    assert_eq!(results.get(mult2.id()), Some(&args([("product", json!(36))])));
}

/// Scenario B: two flagged nodes, in completion order, raw values.
#[tokio::test]
async fn explicit_outputs_in_completion_order() {
    let (graph, _, mult1, mult2) = scenario(3);
    mult1.output();
    mult2.output();

    let results = graph.run(&Executor::new(arithmetic())).await.unwrap();
    let values: Vec<_> = results.values().cloned().collect();
    assert_eq!(
        values,
        vec![args([("product", json!(6))]), args([("product", json!(18))])]
    );
    let ids: Vec<_> = results.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![mult1.id(), mult2.id()]);
}

/// A single node is a chain of one.
#[tokio::test]
async fn single_node_chain() {
    let only = Node::new(args([("b", json!(2))]));
    let mut graph = Graph::new(args([("a", json!(1))]));
    graph.add_node(&only);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn root_precedence() {
    let root = Node::new(args([("b", json!(2))]));
    let mut graph = Graph::new(args([("a", json!(1))]));
    graph.add_node(&root);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.first(), Some(&args([("a", json!(1)), ("b", json!(2))])));

    let overriding = Node::new(args([("a", json!(9)), ("b", json!(2))]));
    let mut graph = Graph::new(args([("a", json!(1))]));
    graph.add_node(&overriding);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.first().unwrap()["a"], json!(9));
}

#[tokio::test]
async fn root_incoming_adapters_read_initial_args() {
    let root = Node::new(ArgMap::new());
    root.adapt_from(Adapter::wrap_in_list("text").with_dest("texts"));
    let mut graph = Graph::new(args([("text", json!("a"))]));
    graph.add_node(&root);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.first().unwrap()["texts"], json!(["a"]));
}

/// Attaching an adapter on the producer or the consumer is equivalent.
#[tokio::test]
async fn adapter_attachment_is_equivalent() {
    async fn consumer_input(on_producer: bool) -> ArgMap {
        let producer = Node::new(args([("sum", json!(5)), ("extra", json!("x"))]));
        let consumer = Node::new(args([("own", json!(true))]));
        let adapter = Adapter::rename("sum", "y");
        if on_producer {
            producer.adapt_to(adapter);
        } else {
            consumer.adapt_from(adapter);
        }
        producer.pipe(&consumer).unwrap();

        let mut graph = Graph::new(args([("seed", json!(0))]));
        graph.add_node(&producer);
        graph.run(&echo()).await.unwrap().into_vec().remove(0).1
    }

    let via_producer = consumer_input(true).await;
    let via_consumer = consumer_input(false).await;
    assert_eq!(via_producer, via_consumer);
    assert_eq!(via_producer["y"], json!(5));
    assert!(via_producer.get("extra").is_none());
}

/// Fan-in merges predecessor fragments in edge order, later wins.
#[tokio::test]
async fn fan_in_merges_in_edge_order() {
    let a = Node::named("a", args([("v", json!("from a")), ("only_a", json!(1))]));
    let b = Node::named("b", args([("v", json!("from b"))]));
    let join = Node::named("join", ArgMap::new());

    a.adapt_to(Adapter::rename("v", "k"))
        .adapt_to(Adapter::identity("only_a"));
    b.adapt_to(Adapter::rename("v", "k"));
    a.pipe(&join).unwrap();
    b.pipe(&join).unwrap();

    let mut graph = Graph::default();
    graph.add_node(&a).add_node(&b);
    join.output();

    let results = graph.run(&echo()).await.unwrap();
    let input = results.get(join.id()).unwrap();
    assert_eq!(input["k"], json!("from b"));
    assert_eq!(input["only_a"], json!(1));
}

/// Scenario C through a graph: navigate into a structured result.
#[tokio::test]
async fn get_adapter_across_edge() {
    let producer = Node::new(args([(
        "completions",
        json!([{"text": "sancho panza"}]),
    )]));
    let consumer = Node::new(ArgMap::new());
    consumer.adapt_from(
        Adapter::get("completions[0].text")
            .unwrap()
            .with_source("completions")
            .with_dest("texts"),
    );
    producer.pipe(&consumer).unwrap();

    let mut graph = Graph::default();
    graph.add_node(&producer);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.first().unwrap()["texts"], json!("sancho panza"));
}

/// Scenario D through a graph.
#[tokio::test]
async fn pick_adapter_across_edge() {
    let producer = Node::new(args([("texts", json!(["a"])), ("other", json!(1))]));
    let consumer = Node::new(ArgMap::new());
    producer.adapt_to(Adapter::pick(["texts"]));
    producer.pipe(&consumer).unwrap();

    let mut graph = Graph::default();
    graph.add_node(&producer);

    let results = graph.run(&echo()).await.unwrap();
    assert_eq!(results.first(), Some(&args([("texts", json!(["a"]))])));
}

#[tokio::test]
async fn branching_without_outputs_is_unresolved() {
    let root = Node::new(ArgMap::new());
    let left = Node::new(ArgMap::new());
    let right = Node::new(ArgMap::new());
    root.pipe_all([&left, &right]).unwrap();

    let mut graph = Graph::default();
    graph.add_node(&root);

    let err = graph.run(&echo()).await.unwrap_err();
    assert!(matches!(err, GraphError::UnresolvedOutput { sinks: 2 }));

    let empty = Graph::default().run(&echo()).await.unwrap_err();
    assert!(matches!(empty, GraphError::UnresolvedOutput { sinks: 0 }));
}

#[tokio::test]
async fn missing_argument_names_the_node() {
    let mult = Node::named("mult", op("mult", 2));
    let mut graph = Graph::default();
    graph.add_node(&mult);

    let err = graph.run(&Executor::new(arithmetic())).await.unwrap_err();
    match err {
        GraphError::MissingArgument { node, name, key } => {
            assert_eq!(node, mult.id());
            assert_eq!(name.as_deref(), Some("mult"));
            assert_eq!(key, "y");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_operation_is_a_compute_error() {
    let node = Node::named("pow", op("pow", 2));
    let mut graph = Graph::default();
    graph.add_node(&node);

    let err = graph.run(&Executor::new(arithmetic())).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::Compute { source: OperationError::UnknownOperation(_), .. }
    ));
}

#[tokio::test]
async fn strict_adapters_fail_the_run() {
    let producer = Node::new(ArgMap::new());
    let consumer = Node::named("consumer", ArgMap::new());
    producer.adapt_to(Adapter::rename("missing", "y"));
    producer.pipe(&consumer).unwrap();

    let mut graph = Graph::default();
    graph.add_node(&producer);

    // Lenient: the missing key is simply absent.
    let lenient = graph.run(&echo()).await.unwrap();
    assert!(lenient.first().unwrap().get("y").is_none());

    let strict = Executor::with_config(
        |a: ArgMap| async move { Ok::<_, OperationError>(a) },
        EngineConfig::default().with_strict_adapters(true),
    );
    let err = graph.run(&strict).await.unwrap_err();
    assert!(matches!(err, GraphError::Adapter { node, .. } if node == consumer.id()));
}

#[tokio::test]
async fn panics_are_reported() {
    let mut ops = OperationRegistry::new();
    ops.register_fn("explode", |_| panic!("kaboom"));
    let node = Node::new(args([("op", json!("explode"))]));
    let mut graph = Graph::default();
    graph.add_node(&node);

    let err = graph.run(&Executor::new(ops)).await.unwrap_err();
    assert!(matches!(err, GraphError::Panicked { ref message, .. } if message == "kaboom"));
}

/// Collaborator that sleeps for `ms` and tracks how many calls overlap.
#[derive(Clone, Default)]
struct Recorder {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    started: Arc<Mutex<Vec<String>>>,
    finished_slow: Arc<AtomicBool>,
}

impl Recorder {
    fn started(&self, tag: &str) -> bool {
        self.started.lock().unwrap().iter().any(|t| t == tag)
    }

    fn registry(&self) -> OperationRegistry {
        let mut ops = OperationRegistry::new();
        let recorder = self.clone();
        ops.register("sleep", move |a: ArgMap| {
            let recorder = recorder.clone();
            async move {
                recorder.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(tag) = a.get("tag").and_then(|v| v.as_str()) {
                    recorder.started.lock().unwrap().push(tag.to_string());
                }
                let now = recorder.current.fetch_add(1, Ordering::SeqCst) + 1;
                recorder.peak.fetch_max(now, Ordering::SeqCst);

                let ms = a.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;

                recorder.current.fetch_sub(1, Ordering::SeqCst);
                if ms >= 200 {
                    recorder.finished_slow.store(true, Ordering::SeqCst);
                }
                Ok(args([("slept", json!(ms))]))
            }
        });
        ops.register_fn("fail", |_| Err(OperationError::failed("boom")));
        ops
    }
}

fn sleep(name: &str, ms: u64) -> Node {
    Node::named(
        name,
        args([("op", json!("sleep")), ("ms", json!(ms)), ("tag", json!(name))]),
    )
}

/// Branches of different depth overlap: the short two-step branch finishes
/// before the long single step.
#[tokio::test]
async fn independent_branches_overlap() {
    let recorder = Recorder::default();
    let root = sleep("root", 0);
    let long = sleep("long", 150);
    let first = sleep("first", 10);
    let second = sleep("second", 10);

    root.pipe_all([&long, &first]).unwrap();
    first.pipe(&second).unwrap();
    long.output();
    second.output();

    let mut graph = Graph::default();
    graph.add_node(&root);

    let results = graph.run(&Executor::new(recorder.registry())).await.unwrap();
    let order: Vec<_> = results.iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![second.id(), long.id()]);
    assert!(recorder.peak.load(Ordering::SeqCst) >= 2);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn concurrency_bound_is_honoured() {
    let recorder = Recorder::default();
    let root = sleep("root", 0);
    let leaves: Vec<_> = (0..4).map(|i| sleep(&format!("leaf{i}"), 20)).collect();
    root.pipe_all(&leaves).unwrap();
    for leaf in &leaves {
        leaf.output();
    }

    let mut graph = Graph::default();
    graph.add_node(&root);

    let executor = Executor::with_config(
        recorder.registry(),
        EngineConfig::default().with_max_concurrency(1),
    );
    let results = graph.run(&executor).await.unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(recorder.peak.load(Ordering::SeqCst), 1);
}

fn failing_graph() -> (Graph, Node) {
    let root = sleep("root", 0);
    let slow = sleep("slow", 200);
    let fail = Node::named("fail", args([("op", json!("fail"))]));
    let after_fail = sleep("after", 0);

    root.pipe_all([&slow, &fail]).unwrap();
    fail.pipe(&after_fail).unwrap();
    slow.output();
    after_fail.output();

    let mut graph = Graph::default();
    graph.add_node(&root);
    (graph, fail)
}

#[tokio::test]
async fn failure_cancels_siblings() {
    let recorder = Recorder::default();
    let (graph, fail) = failing_graph();

    let err = graph.run(&Executor::new(recorder.registry())).await.unwrap_err();
    assert!(matches!(err, GraphError::Compute { node, .. } if node == fail.id()));

    // The failed node's successor never launched, and slow was aborted.
    assert!(recorder.started("root"));
    assert!(!recorder.started("after"));
    assert!(!recorder.finished_slow.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failure_drains_siblings() {
    let recorder = Recorder::default();
    let (graph, fail) = failing_graph();

    let executor = Executor::with_config(
        recorder.registry(),
        EngineConfig::default().with_failure_policy(FailurePolicy::Drain),
    );
    let err = graph.run(&executor).await.unwrap_err();
    assert_eq!(err.node(), Some(fail.id()));

    assert!(!recorder.started("after"));
    assert!(recorder.started("slow"));
    assert!(recorder.finished_slow.load(Ordering::SeqCst));
}

/// Wiring a cycle fails and leaves the graph as it was.
#[test]
fn cycle_rejection_keeps_graph() {
    let (graph, add, _, mult2) = scenario(6);
    let before = graph.to_document();

    let err = mult2.pipe(&add).unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
    assert_eq!(graph.to_document(), before);
}

#[tokio::test]
async fn document_round_trip_runs_identically() {
    let (graph, _, mult1, mult2) = scenario(3);
    mult1.output();
    mult2.output();

    let doc = graph.to_document();
    let restored = Graph::from_json(&graph.to_json_pretty().unwrap()).unwrap();
    assert_eq!(restored.to_document(), doc);

    let executor = Executor::new(arithmetic());
    let original = graph.run(&executor).await.unwrap();
    let replayed = restored.run(&executor).await.unwrap();
    assert_eq!(original, replayed);
}
