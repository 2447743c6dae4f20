//! Headless playback of a small demo scene.
//!
//! Usage: `playback [config.toml] [frames]`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use common::log_setup::setup_logging;
use engine::prelude::*;
use tokio::runtime::Handle;
use tracing::{info, warn};

fn demo_scene() -> Result<Arc<Scene>> {
    let registry = Arc::new(OperatorRegistry::with_builtins());
    let factory = || NodeFactory::from_registry(Arc::clone(&registry));
    let scene = Arc::new(Scene::new());

    let mut driver = Graph::new(factory());
    let time = driver.create_node("time", "time")?;
    let half = driver.create_node("multiply", "half")?;
    driver.set_parameter(&half, "factor", 0.5)?;
    driver.connect(SocketRef::new(time, 1), SocketRef::new(half, 0))?;
    scene.add_entity("driver", driver)?;

    let mut follower = Graph::new(factory());
    let import = follower.create_node("import", "import")?;
    follower.set_parameter(&import, "entity", "driver")?;
    let offset = follower.create_node("add", "offset")?;
    follower.set_parameter(&offset, "offset", 1.0)?;
    follower.connect(SocketRef::new(import, 0), SocketRef::new(offset, 0))?;
    scene.add_entity("follower", follower)?;

    let mut sim = Graph::new(factory());
    let rate = sim.create_node("constant", "rate")?;
    sim.set_parameter(&rate, "value", 0.25)?;
    let total = sim.create_node("accumulate", "total")?;
    sim.connect(SocketRef::new(rate, 0), SocketRef::new(total, 0))?;
    scene.add_entity("sim", sim)?;

    let mut particles = Graph::new(factory());
    let range = particles.create_node("range", "range")?;
    particles.set_parameter(&range, "count", 200_000_i64)?;
    let scale = particles.create_node("scale_array", "scale")?;
    particles.set_parameter(&scale, "factor", 2.0)?;
    particles.connect(SocketRef::new(range, 0), SocketRef::new(scale, 0))?;
    scene.add_entity("particles", particles)?;

    Ok(scene)
}

fn log_stats(stats: &ExecutionStats) {
    info!(
        run_id = stats.run_id,
        reason = %stats.reason,
        state = %stats.state,
        executed = stats.executed_nodes.len(),
        cached = stats.cached_nodes.len(),
        errors = stats.node_errors.len(),
        elapsed_secs = stats.elapsed_secs,
        "Run stats"
    );
    for error in stats.node_errors.iter() {
        warn!(entity = %error.entity_id, message = %error.message, "Node error");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("engine.toml"));
    let frames: i64 = match args.next() {
        Some(frames) => frames.parse()?,
        None => 48,
    };

    let config = EngineConfig::load_or_default(&config_path);
    setup_logging(&config.log_level, Path::new("logs"), "engine");
    info!(config = %config_path.display(), frames, "Starting playback");

    let (bus, mut events) = NotificationBus::channel();
    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EvaluationEvent::RequestDropped { reason } => {
                    warn!(%reason, "Request dropped");
                }
                EvaluationEvent::RunCompleted { run_id, state, .. } => {
                    info!(run_id, %state, "Run completed");
                }
                _ => {}
            }
        }
    });

    let scene = demo_scene()?;
    let mut evaluator = Evaluator::new(Arc::clone(&scene), config, bus, Handle::current());
    evaluator.set_playing(true);

    let opened = evaluator
        .request_evaluation(ChangeReason::FileOpened, "demo scene")?
        .finish()
        .await?
        .ok_or_else(|| anyhow!("initial evaluation was dropped"))?;
    log_stats(&opened);

    for _ in 0..frames {
        if let Some(stats) = evaluator.advance_frame()?.finish().await? {
            log_stats(&stats);
        }
    }

    for entity in scene.entities() {
        info!(
            entity = entity.name(),
            frame = evaluator.frame(),
            value = ?entity.output_value(0).and_then(|value| value.as_f64()),
            "Final value"
        );
    }

    drop(evaluator);
    listener.await?;
    Ok(())
}
