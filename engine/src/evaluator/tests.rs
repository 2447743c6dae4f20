use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::entity::Entity;
use crate::error::Error;
use crate::execution_stats::NodeError;
use crate::graph::Graph;
use crate::network::DependencyCompilationError;
use crate::testing::{PROBE, TestScene, link, test_factory};

fn evaluator_for(
    scene: &Arc<Scene>,
    config: EngineConfig,
) -> (Evaluator, UnboundedReceiver<EvaluationEvent>) {
    let (bus, rx) = NotificationBus::channel();
    let evaluator = Evaluator::new(Arc::clone(scene), config, bus, Handle::current());
    (evaluator, rx)
}

fn drain(rx: &mut UnboundedReceiver<EvaluationEvent>) -> Vec<EvaluationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn open(evaluator: &mut Evaluator) -> anyhow::Result<ExecutionStats> {
    let stats = evaluator
        .request_evaluation(ChangeReason::FileOpened, "open")?
        .finish()
        .await?;
    stats.ok_or_else(|| anyhow::anyhow!("request dropped"))
}

async fn completed(request: EvaluationRequest) -> anyhow::Result<ExecutionStats> {
    request
        .finish()
        .await?
        .ok_or_else(|| anyhow::anyhow!("request dropped"))
}

/// `slow` sleeps in its only node, `fast` follows it in scene order.
fn slow_scene(sleep_ms: i64) -> anyhow::Result<(Arc<Scene>, Arc<Entity>, Arc<Entity>)> {
    let scene = Arc::new(Scene::new());

    let mut graph = Graph::new(test_factory());
    let sleeper = graph.create_node(PROBE, "sleeper")?;
    graph.set_parameter(&sleeper, "sleep_ms", sleep_ms)?;
    let slow = scene.add_entity("slow", graph)?;

    let mut graph = Graph::new(test_factory());
    graph.create_node(PROBE, "probe")?;
    let fast = scene.add_entity("fast", graph)?;

    Ok((scene, slow, fast))
}

#[tokio::test(flavor = "multi_thread")]
async fn opening_evaluates_every_entity() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, mut rx) = evaluator_for(&fixture.scene, EngineConfig::default());

    let request = evaluator.request_evaluation(ChangeReason::FileOpened, "open")?;
    assert!(matches!(request, EvaluationRequest::Started(_)));
    let stats = completed(request).await?;

    assert_eq!(stats.state, RunState::Completed);
    assert_eq!(stats.executed_nodes.len(), 6);
    assert_eq!(TestScene::value_of(&fixture.a), Some(0.0));
    assert_eq!(TestScene::value_of(&fixture.b), Some(1.0));
    assert_eq!(TestScene::value_of(&fixture.c), Some(5.0));
    assert_eq!(evaluator.state(), RunState::Completed);

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(EvaluationEvent::RunStarted { run_id: 1, .. })
    ));
    assert_eq!(
        events.last(),
        Some(&EvaluationEvent::RunCompleted {
            run_id: 1,
            state: RunState::Completed,
            executed_nodes: 6,
            node_errors: 0,
        })
    );

    // Reopening forces everything again.
    let stats = open(&mut evaluator).await?;
    assert_eq!(stats.executed_nodes.len(), 6);
    assert_eq!(stats.run_id, 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn time_change_runs_time_dependents_inline() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());
    open(&mut evaluator).await?;

    let request = evaluator.set_time(3)?;
    assert!(matches!(request, EvaluationRequest::Completed(_)));
    let stats = completed(request).await?;

    assert!(stats.is_time_step);
    assert_eq!(stats.executed_count(&fixture.a.id()), 2);
    assert_eq!(stats.executed_count(&fixture.b.id()), 2);
    assert_eq!(stats.executed_count(&fixture.c.id()), 0);
    assert!(stats.cached_nodes.iter().all(|(id, _)| *id != fixture.c.id()));
    assert_eq!(TestScene::value_of(&fixture.a), Some(6.0));
    assert_eq!(TestScene::value_of(&fixture.b), Some(7.0));
    assert_eq!(evaluator.frame(), 3);

    let plan = Planner::plan(ChangeReason::TimeChanged, None, evaluator.network().unwrap(), "");
    assert!(plan.is_time_step());
    assert_eq!(plan.entity_ids(), [fixture.a.id(), fixture.b.id()]);

    let probe = TestScene::node_id(&fixture.c, "probe");
    assert_eq!(fixture.c.graph().node(&probe).unwrap().execution_count(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn parameter_change_reaches_downstream_entities_only() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());
    open(&mut evaluator).await?;
    completed(evaluator.set_time(3)?).await?;

    let double = TestScene::node_id(&fixture.a, "double");
    fixture.a.graph().set_parameter(&double, "factor", 3.0)?;
    evaluator.set_active_entity(Some(fixture.a.id()));

    let stats = completed(evaluator.request_evaluation(ChangeReason::ParameterChanged, "factor")?)
        .await?;

    assert_eq!(stats.executed_count(&fixture.a.id()), 1);
    assert_eq!(stats.executed_count(&fixture.b.id()), 2);
    assert_eq!(stats.executed_count(&fixture.c.id()), 0);
    assert_eq!(TestScene::value_of(&fixture.a), Some(9.0));
    assert_eq!(TestScene::value_of(&fixture.b), Some(10.0));

    let network = evaluator.network().unwrap();
    let plan = Planner::plan(
        ChangeReason::ParameterChanged,
        evaluator.active_entity(),
        network,
        "",
    );
    assert_eq!(plan.entity_ids(), [fixture.a.id(), fixture.b.id()]);

    // Nothing changed since: the same request is a no-op.
    let stats = completed(evaluator.request_evaluation(ChangeReason::ParameterChanged, "again")?)
        .await?;
    assert!(stats.executed_nodes.is_empty());
    assert_eq!(stats.cached_nodes.len(), 4);
    assert_eq!(TestScene::value_of(&fixture.b), Some(10.0));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn node_failure_completes_with_errors() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());
    open(&mut evaluator).await?;

    let probe = TestScene::node_id(&fixture.c, "probe");
    fixture.c.graph().set_parameter(&probe, "fail", true)?;
    evaluator.set_active_entity(Some(fixture.c.id()));

    let stats = completed(evaluator.request_evaluation(ChangeReason::ParameterChanged, "fail")?)
        .await?;

    assert_eq!(stats.state, RunState::Completed);
    let errors: Vec<&NodeError> = stats.errors_for(&fixture.c.id()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].node_id, Some(probe));
    assert_eq!(errors[0].message, "probe failed");
    assert_eq!(TestScene::value_of(&fixture.c), Some(5.0));
    assert_eq!(TestScene::value_of(&fixture.b), Some(1.0));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn interruption_skips_remaining_entities() -> anyhow::Result<()> {
    let (scene, slow, fast) = slow_scene(300)?;
    let (mut evaluator, _rx) = evaluator_for(&scene, EngineConfig::default());

    let request = evaluator.request_evaluation(ChangeReason::FileOpened, "open")?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    evaluator.interrupt();
    let stats = completed(request).await?;

    assert!(stats.interrupted());
    assert_eq!(evaluator.state(), RunState::Interrupted);
    assert!(stats.skipped_entities.contains(&fast.id()));
    assert!(slow.graph().output_value(0).is_none());
    assert!(fast.graph().output_value(0).is_none());

    // The next request starts clean.
    let stats = open(&mut evaluator).await?;
    assert_eq!(stats.state, RunState::Completed);
    assert!(fast.graph().output_value(0).is_some());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dependents_skipped_by_an_interruption_stay_stale() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());
    open(&mut evaluator).await?;
    completed(evaluator.set_time(3)?).await?;

    // Runs after `double` and interrupts the pass before `B` gets its turn.
    let stopper = fixture.a.graph().create_node(PROBE, "stopper")?;
    fixture.a.graph().set_parameter(&stopper, "interrupt", true)?;
    let double = TestScene::node_id(&fixture.a, "double");
    fixture.a.graph().set_parameter(&double, "factor", 3.0)?;
    evaluator.set_active_entity(Some(fixture.a.id()));

    let stats = completed(evaluator.request_evaluation(ChangeReason::ParameterChanged, "factor")?)
        .await?;
    assert!(stats.interrupted());
    assert!(stats.skipped_entities.contains(&fixture.b.id()));
    assert_eq!(TestScene::value_of(&fixture.a), Some(9.0));
    assert_eq!(TestScene::value_of(&fixture.b), Some(7.0));

    // A later plan that leaves out `A` still refreshes `B`.
    evaluator.set_active_entity(Some(fixture.b.id()));
    let stats = completed(evaluator.request_evaluation(ChangeReason::GraphChanged, "edit")?)
        .await?;
    assert_eq!(stats.state, RunState::Completed);
    assert_eq!(stats.executed_count(&fixture.a.id()), 0);
    assert_eq!(stats.executed_count(&fixture.b.id()), 2);
    assert_eq!(TestScene::value_of(&fixture.b), Some(10.0));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_during_a_run_are_dropped() -> anyhow::Result<()> {
    let (scene, _slow, _fast) = slow_scene(150)?;
    let (mut evaluator, mut rx) = evaluator_for(&scene, EngineConfig::default());

    let first = evaluator.request_evaluation(ChangeReason::FileOpened, "open")?;
    assert!(evaluator.is_running());

    let second = evaluator.request_evaluation(ChangeReason::GraphChanged, "edit")?;
    assert!(second.is_dropped());
    assert!(second.finish().await?.is_none());

    completed(first).await?;
    assert!(!evaluator.is_running());

    let events = drain(&mut rx);
    assert!(events.contains(&EvaluationEvent::RequestDropped {
        reason: "GraphChanged".to_string(),
    }));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, EvaluationEvent::RunCompleted { .. }))
    );

    let third = evaluator.request_evaluation(ChangeReason::EntityAdded, "retry")?;
    assert!(!third.is_dropped());
    completed(third).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_error_releases_the_claim() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());

    let import = TestScene::node_id(&fixture.b, "import");
    fixture.b.graph().set_parameter(&import, "entity", "nowhere")?;

    let result = evaluator.request_evaluation(ChangeReason::FileOpened, "open");
    assert!(matches!(
        result,
        Err(Error::Dependency(DependencyCompilationError::MissingEntity(ref name))) if name == "nowhere"
    ));
    assert!(!evaluator.is_running());
    assert!(evaluator.network().is_none());

    fixture.b.graph().set_parameter(&import, "entity", "A")?;
    let stats = open(&mut evaluator).await?;
    assert_eq!(stats.executed_nodes.len(), 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn render_and_foreground_config_run_inline() -> anyhow::Result<()> {
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, EngineConfig::default());

    let request = evaluator.request_evaluation(ChangeReason::RenderRequested, "render")?;
    assert!(matches!(request, EvaluationRequest::Completed(_)));
    assert_eq!(TestScene::value_of(&fixture.b), Some(1.0));

    let config = EngineConfig {
        background_one_shot: false,
        ..EngineConfig::default()
    };
    let fixture = TestScene::new()?;
    let (mut evaluator, _rx) = evaluator_for(&fixture.scene, config);
    let request = evaluator.request_evaluation(ChangeReason::FileOpened, "open")?;
    assert!(matches!(request, EvaluationRequest::Completed(_)));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn simulation_steps_with_playback() -> anyhow::Result<()> {
    let scene = Arc::new(Scene::new());
    let mut graph = Graph::new(test_factory());
    let rate = graph.create_node("constant", "rate")?;
    graph.set_parameter(&rate, "value", 1.0)?;
    let sim = graph.create_node("accumulate", "sim")?;
    link(&mut graph, rate, sim)?;
    let entity = scene.add_entity("sim", graph)?;

    let (mut evaluator, _rx) = evaluator_for(&scene, EngineConfig::default());
    evaluator.set_playing(true);
    open(&mut evaluator).await?;

    let mut totals = vec![TestScene::value_of(&entity).unwrap()];
    for _ in 0..3 {
        completed(evaluator.advance_frame()?).await?;
        totals.push(TestScene::value_of(&entity).unwrap());
    }
    completed(evaluator.set_time(3)?).await?;
    totals.push(TestScene::value_of(&entity).unwrap());
    completed(evaluator.set_time(100)?).await?;
    totals.push(TestScene::value_of(&entity).unwrap());

    assert_eq!(totals, [0.0, 1.0, 2.0, 3.0, 3.0, 0.0]);

    // Playback wraps to the start of the range.
    completed(evaluator.set_time(evaluator.config().time_range.end)?).await?;
    completed(evaluator.advance_frame()?).await?;
    assert_eq!(evaluator.frame(), evaluator.config().time_range.start);

    Ok(())
}
