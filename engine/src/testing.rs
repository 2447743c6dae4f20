//! Fixtures shared by the engine's test suites.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::data::{DataType, DynamicValue, StaticValue};
use crate::entity::{Entity, Scene};
use crate::file_manager::FileCache;
use crate::graph::{Graph, NodeFactory, NodeId, SocketRef};
use crate::operator::{Operator, OperatorContext, Outcome, SocketDef};
use crate::operators::OperatorRegistry;
use crate::progress::ProgressCoordinator;

pub(crate) const PROBE: &str = "probe";

/// Passes its input through, or its `value` parameter when unlinked.
///
/// Parameters steer it: `fail` returns a failure, `interrupt` interrupts the
/// run from inside `execute`, `sleep_ms` burns time, `from_entry` outputs the
/// graph's entry slot as a float.
#[derive(Debug, Default)]
pub(crate) struct Probe;

impl Operator for Probe {
    fn type_name(&self) -> &str {
        PROBE
    }

    fn inputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("in", DataType::Any)]
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("out", DataType::Any)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        if let Some(ms) = ctx.parameter("sleep_ms").and_then(|ms| ms.as_i64()) {
            thread::sleep(Duration::from_millis(ms as u64));
        }
        if flag(ctx, "interrupt") {
            ctx.execution_context().coordinator().interrupt();
        }
        if flag(ctx, "fail") {
            return Outcome::failure("probe failed");
        }

        let value = if flag(ctx, "from_entry") {
            ctx.entry()
                .get::<f64>()
                .map(|value| DynamicValue::Float(*value))
                .unwrap_or_default()
        } else if !ctx.input(0).is_none() {
            ctx.input(0).clone()
        } else {
            ctx.parameter("value")
                .map(DynamicValue::from)
                .unwrap_or(DynamicValue::Float(0.0))
        };

        ctx.set_output(0, value);
        Outcome::Success
    }
}

fn flag(ctx: &OperatorContext<'_>, name: &str) -> bool {
    matches!(ctx.parameter(name), Some(StaticValue::Bool(true)))
}

pub(crate) fn test_registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::with_builtins();
    registry.register(PROBE, || Box::new(Probe));
    registry
}

pub(crate) fn test_factory() -> NodeFactory {
    NodeFactory::from_registry(Arc::new(test_registry()))
}

pub(crate) fn test_context(scene: Arc<Scene>) -> ExecutionContext {
    ExecutionContext::new(
        scene,
        Arc::new(FileCache::new()),
        Arc::new(ProgressCoordinator::default()),
    )
}

pub(crate) fn link(graph: &mut Graph, from: NodeId, to: NodeId) -> crate::error::Result<()> {
    graph.connect(SocketRef::new(from, 0), SocketRef::new(to, 0))
}

/// A chain `probe_0 -> probe_1 -> .. -> probe_{len-1}`.
pub(crate) fn probe_chain(len: usize) -> anyhow::Result<(Graph, Vec<NodeId>)> {
    let mut graph = Graph::new(test_factory());
    let mut ids = Vec::with_capacity(len);

    for idx in 0..len {
        let id = graph.create_node(PROBE, format!("probe_{}", idx))?;
        if let Some(prev) = ids.last() {
            link(&mut graph, *prev, id)?;
        }
        ids.push(id);
    }
    graph.set_parameter(&ids[0], "value", 1.0)?;

    Ok((graph, ids))
}

/// Three entities:
/// - `A`: `time -> multiply(x2)`, time-driven.
/// - `B`: `import(A) -> add(+1)`, depends on `A`.
/// - `C`: `constant(5) -> probe`, standalone.
pub(crate) struct TestScene {
    pub scene: Arc<Scene>,
    pub a: Arc<Entity>,
    pub b: Arc<Entity>,
    pub c: Arc<Entity>,
}

impl TestScene {
    pub fn new() -> anyhow::Result<Self> {
        let scene = Arc::new(Scene::new());

        let mut graph_a = Graph::new(test_factory());
        let time = graph_a.create_node("time", "time")?;
        let double = graph_a.create_node("multiply", "double")?;
        graph_a.set_parameter(&double, "factor", 2.0)?;
        link(&mut graph_a, time, double)?;
        let a = scene.add_entity("A", graph_a)?;

        let mut graph_b = Graph::new(test_factory());
        let import = graph_b.create_node("import", "import")?;
        graph_b.set_parameter(&import, "entity", "A")?;
        let add = graph_b.create_node("add", "add_one")?;
        graph_b.set_parameter(&add, "offset", 1.0)?;
        link(&mut graph_b, import, add)?;
        let b = scene.add_entity("B", graph_b)?;

        let mut graph_c = Graph::new(test_factory());
        let constant = graph_c.create_node("constant", "constant")?;
        graph_c.set_parameter(&constant, "value", 5.0)?;
        let probe = graph_c.create_node(PROBE, "probe")?;
        link(&mut graph_c, constant, probe)?;
        let c = scene.add_entity("C", graph_c)?;

        Ok(Self { scene, a, b, c })
    }

    pub fn value_of(entity: &Entity) -> Option<f64> {
        entity.graph().output_value(0).and_then(DynamicValue::as_f64)
    }

    pub fn node_id(entity: &Entity, name: &str) -> NodeId {
        entity
            .graph()
            .by_name(name)
            .map(|node| node.id)
            .expect("fixture node exists")
    }
}
