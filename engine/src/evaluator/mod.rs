use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::entity::{EntityDatabase, EntityId, Scene};
use crate::error::Result;
use crate::execution_stats::ExecutionStats;
use crate::executor::{Executor, RunHandle};
use crate::file_manager::{FileCache, FileManager};
use crate::network::{DependencyCompiler, DependencyNetwork};
use crate::plan::{ChangeReason, Planner};
use crate::progress::{EvaluationEvent, NotificationBus, ProgressCoordinator, RunState};

#[cfg(test)]
mod tests;

#[derive(Debug)]
pub enum EvaluationRequest {
    /// The plan ran inline and finished.
    Completed(ExecutionStats),
    /// The plan is running in the background.
    Started(RunHandle),
    /// A run was already in flight. Nothing happened; re-request after the
    /// completion notification.
    Dropped,
}

impl EvaluationRequest {
    pub fn is_dropped(&self) -> bool {
        matches!(self, EvaluationRequest::Dropped)
    }

    /// Stats of a finished run, waiting for a background one.
    pub async fn finish(self) -> Result<Option<ExecutionStats>> {
        match self {
            EvaluationRequest::Completed(stats) => Ok(Some(stats)),
            EvaluationRequest::Started(handle) => handle.wait().await.map(Some),
            EvaluationRequest::Dropped => Ok(None),
        }
    }
}

/// Entry point for the command layer: turns change events into runs.
///
/// Owns the run state for its scene. Each request compiles a fresh
/// dependency network, plans, and executes, with at most one run in flight.
pub struct Evaluator {
    scene: Arc<Scene>,
    files: Arc<dyn FileManager>,
    coordinator: Arc<ProgressCoordinator>,
    runtime: Handle,
    config: EngineConfig,

    frame: i64,
    playing: bool,
    active_entity: Option<EntityId>,
    network: Option<Arc<DependencyNetwork>>,
}

impl Evaluator {
    pub fn new(scene: Arc<Scene>, config: EngineConfig, bus: NotificationBus, runtime: Handle) -> Self {
        Self {
            scene,
            files: Arc::new(FileCache::new()),
            coordinator: Arc::new(ProgressCoordinator::new(bus)),
            runtime,
            frame: config.time_range.start,
            config,
            playing: false,
            active_entity: None,
            network: None,
        }
    }

    pub fn with_file_manager(mut self, files: Arc<dyn FileManager>) -> Self {
        self.files = files;
        self
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn coordinator(&self) -> &Arc<ProgressCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn active_entity(&self) -> Option<EntityId> {
        self.active_entity
    }

    pub fn set_active_entity(&mut self, entity_id: Option<EntityId>) {
        self.active_entity = entity_id;
    }

    /// Network compiled by the most recent accepted request.
    pub fn network(&self) -> Option<&DependencyNetwork> {
        self.network.as_deref()
    }

    pub fn state(&self) -> RunState {
        self.coordinator.state()
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    /// Asks the current run to stop at the next node boundary.
    pub fn interrupt(&self) {
        self.coordinator.interrupt();
    }

    pub fn request_evaluation(
        &mut self,
        reason: ChangeReason,
        message: &str,
    ) -> Result<EvaluationRequest> {
        if !self.coordinator.try_claim() {
            debug!(%reason, message, "Evaluation in progress, request dropped");
            self.coordinator
                .bus()
                .send(EvaluationEvent::RequestDropped {
                    reason: reason.to_string(),
                });
            return Ok(EvaluationRequest::Dropped);
        }

        let network = match DependencyCompiler::compile(self.scene.as_ref()) {
            Ok(network) => Arc::new(network),
            Err(err) => {
                self.coordinator.release_claim();
                return Err(err.into());
            }
        };
        self.network = Some(Arc::clone(&network));

        let plan = Planner::plan(reason, self.active_entity, &network, message);
        let ctx = self.context();
        Executor::prepare(&plan, &network, &ctx);

        if plan.runs_inline() || !self.config.background_one_shot {
            let stats = Executor::run(&plan, &network, &ctx);
            return Ok(EvaluationRequest::Completed(stats));
        }

        info!(%reason, entities = plan.entries().len(), "Starting background evaluation");
        Ok(EvaluationRequest::Started(Executor::spawn(
            &self.runtime,
            plan,
            network,
            ctx,
        )))
    }

    /// Moves the current time and evaluates everything time-dependent.
    pub fn set_time(&mut self, frame: i64) -> Result<EvaluationRequest> {
        self.frame = frame;
        self.request_evaluation(ChangeReason::TimeChanged, &format!("frame {}", frame))
    }

    /// Steps to the next frame, wrapping at the end of the time range.
    pub fn advance_frame(&mut self) -> Result<EvaluationRequest> {
        let next = self.config.time_range.next(self.frame);
        self.set_time(next)
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext {
            frame: self.frame,
            fps: self.config.fps,
            playing: self.playing,
            time_range: self.config.time_range,
            render_rect: self.config.render_rect,
            parallel_chunk_size: self.config.parallel_chunk_size,
            entities: Arc::clone(&self.scene) as Arc<dyn EntityDatabase>,
            files: Arc::clone(&self.files),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
