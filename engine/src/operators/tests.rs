use std::fs;
use std::sync::Arc;

use super::*;
use crate::data::DynamicValue;
use crate::entity::Scene;
use crate::graph::{Graph, NodeId};
use crate::testing::{link, test_context, test_factory};

fn output(graph: &Graph, id: &NodeId, socket_idx: usize) -> Option<DynamicValue> {
    graph.node(id)?.output_value(socket_idx).cloned()
}

#[test]
fn builtins_are_registered() {
    let registry = OperatorRegistry::with_builtins();

    assert_eq!(
        registry.type_names(),
        [
            "accumulate",
            "add",
            "constant",
            "file_size",
            "import",
            "keyframes",
            "multiply",
            "range",
            "scale_array",
            "time",
        ]
    );
    assert!(registry.contains("import"));
    assert!(registry.create("missing").is_none());

    let time = registry.create("time").unwrap();
    assert_eq!(time.type_name(), "time");
    assert!(time.depends_on_time());
    assert!(!registry.create("constant").unwrap().depends_on_time());
}

#[test]
fn registration_replaces_constructor() {
    let mut registry = OperatorRegistry::new();
    registry.register("thing", || Box::new(Constant));
    registry.register("thing", || Box::new(Multiply));

    assert_eq!(registry.type_names(), ["thing"]);
    assert_eq!(registry.create("thing").unwrap().type_name(), "multiply");
}

#[test]
fn time_reports_frame_and_seconds() -> anyhow::Result<()> {
    let ctx = test_context(Arc::new(Scene::new())).with_frame(48);
    let mut graph = Graph::new(test_factory());
    let time = graph.create_node("time", "time")?;

    graph.evaluate(&ctx, 1)?;

    assert_eq!(output(&graph, &time, 0), Some(DynamicValue::Int(48)));
    assert_eq!(output(&graph, &time, 1).and_then(|v| v.as_f64()), Some(2.0));

    Ok(())
}

#[test]
fn keyframes_follow_the_frame() -> anyhow::Result<()> {
    let scene = Arc::new(Scene::new());
    let mut graph = Graph::new(test_factory());
    let keys = graph.create_node("keyframes", "keys")?;
    graph.set_parameter(&keys, "keys", vec![0.0, 0.0, 10.0, 100.0])?;

    let mut samples = Vec::new();
    for (run_id, frame) in [(1, 0), (2, 5), (3, 20)] {
        let ctx = test_context(Arc::clone(&scene)).with_frame(frame);
        graph.mark_time_dependent();
        graph.evaluate(&ctx, run_id)?;
        samples.push(output(&graph, &keys, 0).and_then(|v| v.as_f64()).unwrap());
    }
    assert_eq!(samples, [0.0, 50.0, 100.0]);

    graph.set_parameter(&keys, "keys", vec![1.0, 2.0, 3.0])?;
    let run = graph.evaluate(&test_context(scene), 4)?;
    assert_eq!(run.errors.len(), 1);

    Ok(())
}

#[test]
fn arithmetic_failures_are_reported() -> anyhow::Result<()> {
    let ctx = test_context(Arc::new(Scene::new()));
    let mut graph = Graph::new(test_factory());
    let lonely = graph.create_node("multiply", "lonely")?;
    let text = graph.create_node("constant", "text")?;
    graph.set_parameter(&text, "value", "seven")?;
    let sum = graph.create_node("add", "sum")?;
    link(&mut graph, text, sum)?;
    let negative = graph.create_node("range", "negative")?;
    graph.set_parameter(&negative, "count", -1_i64)?;

    let run = graph.evaluate(&ctx, 1)?;

    let failed: Vec<NodeId> = run.errors.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, [lonely, sum, negative]);
    assert_eq!(
        graph.node(&lonely).unwrap().warnings(),
        ["missing input 'value'"]
    );

    Ok(())
}

#[test]
fn import_reads_other_entity_result() -> anyhow::Result<()> {
    let scene = Arc::new(Scene::new());
    let ctx = test_context(Arc::clone(&scene));

    let mut source_graph = Graph::new(test_factory());
    let constant = source_graph.create_node("constant", "constant")?;
    source_graph.set_parameter(&constant, "value", 3.0)?;
    let source = scene.add_entity("source", source_graph)?;

    let mut reader_graph = Graph::new(test_factory());
    let import = reader_graph.create_node("import", "import")?;
    reader_graph.set_parameter(&import, "entity", "source")?;
    let reader = scene.add_entity("reader", reader_graph)?;

    // Source never evaluated: nothing to import yet.
    let run = reader.graph().evaluate(&ctx, 1)?;
    assert_eq!(run.errors[0].1, "entity 'source' has no result");

    source.graph().evaluate(&ctx, 2)?;
    let run = reader.graph().evaluate(&ctx, 3)?;
    assert!(run.errors.is_empty());
    assert_eq!(reader.output_value(0), Some(DynamicValue::Float(3.0)));

    Ok(())
}

#[test]
fn file_size_goes_through_file_manager() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("engine_file_size_{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path = dir.join("payload.bin");
    fs::write(&path, [0_u8; 12])?;

    let ctx = test_context(Arc::new(Scene::new()));
    let mut graph = Graph::new(test_factory());
    let size = graph.create_node("file_size", "size")?;
    graph.set_parameter(&size, "path", &*path.to_string_lossy())?;
    let missing = graph.create_node("file_size", "missing")?;
    let absent = dir.join("absent.bin");
    graph.set_parameter(&missing, "path", &*absent.to_string_lossy())?;

    let run = graph.evaluate(&ctx, 1)?;

    assert_eq!(output(&graph, &size, 0), Some(DynamicValue::Int(12)));
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].0, missing);

    fs::remove_dir_all(&dir)?;
    Ok(())
}
