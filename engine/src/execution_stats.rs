use crate::entity::EntityId;
use crate::graph::{GraphRun, NodeId};
use crate::plan::ChangeReason;
use crate::progress::RunState;

#[derive(Debug, Clone)]
pub struct ExecutedNodeStats {
    pub entity_id: EntityId,
    pub node_id: NodeId,
    pub self_secs: f64,
    pub cumulative_secs: f64,
}

/// A node failure, or an entity-level failure when `node_id` is `None`.
#[derive(Debug, Clone)]
pub struct NodeError {
    pub entity_id: EntityId,
    pub node_id: Option<NodeId>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionStats {
    pub run_id: u64,
    pub reason: ChangeReason,
    pub is_time_step: bool,
    pub state: RunState,
    pub elapsed_secs: f64,

    pub executed_nodes: Vec<ExecutedNodeStats>,
    pub cached_nodes: Vec<(EntityId, NodeId)>,
    pub node_errors: Vec<NodeError>,
    /// Plan entries never started because the run was interrupted.
    pub skipped_entities: Vec<EntityId>,
}

impl ExecutionStats {
    pub fn new(run_id: u64, reason: ChangeReason, is_time_step: bool) -> Self {
        Self {
            run_id,
            reason,
            is_time_step,
            state: RunState::Running,
            elapsed_secs: 0.0,
            executed_nodes: Vec::new(),
            cached_nodes: Vec::new(),
            node_errors: Vec::new(),
            skipped_entities: Vec::new(),
        }
    }

    pub fn interrupted(&self) -> bool {
        self.state == RunState::Interrupted
    }

    pub fn executed_count(&self, entity_id: &EntityId) -> usize {
        self.executed_nodes
            .iter()
            .filter(|node| node.entity_id == *entity_id)
            .count()
    }

    pub fn errors_for(&self, entity_id: &EntityId) -> impl Iterator<Item = &NodeError> {
        self.node_errors
            .iter()
            .filter(move |error| error.entity_id == *entity_id)
    }

    pub(crate) fn absorb(&mut self, entity_id: EntityId, run: GraphRun) {
        self.executed_nodes
            .extend(run.executed.into_iter().map(|node| ExecutedNodeStats {
                entity_id,
                node_id: node.node_id,
                self_secs: node.self_secs,
                cumulative_secs: node.cumulative_secs,
            }));
        self.cached_nodes
            .extend(run.cached.into_iter().map(|node_id| (entity_id, node_id)));
        self.node_errors
            .extend(run.errors.into_iter().map(|(node_id, message)| NodeError {
                entity_id,
                node_id: Some(node_id),
                message,
            }));
    }
}
