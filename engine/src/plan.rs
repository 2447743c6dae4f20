use strum_macros::{Display, EnumIter};
use tracing::debug;

use crate::entity::EntityId;
use crate::network::{DependencyNetwork, NetworkNodeId};

/// Why an evaluation was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ChangeReason {
    NodeAdded,
    NodeRemoved,
    NodeSelected,
    ParameterChanged,
    GraphChanged,
    EntityAdded,
    EntityRemoved,
    FileOpened,
    RenderRequested,
    TimeChanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanScope {
    /// The active entity and everything downstream of it.
    Subtree,
    /// Every entity.
    Scene,
    /// Everything downstream of the time node.
    Time,
}

impl ChangeReason {
    pub fn scope(&self) -> PlanScope {
        match self {
            ChangeReason::NodeAdded
            | ChangeReason::NodeRemoved
            | ChangeReason::NodeSelected
            | ChangeReason::ParameterChanged
            | ChangeReason::GraphChanged => PlanScope::Subtree,
            ChangeReason::EntityAdded
            | ChangeReason::EntityRemoved
            | ChangeReason::FileOpened
            | ChangeReason::RenderRequested => PlanScope::Scene,
            ChangeReason::TimeChanged => PlanScope::Time,
        }
    }

    /// Reasons whose caller waits for the result.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, ChangeReason::RenderRequested)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    pub network_node: NetworkNodeId,
    pub entity_id: EntityId,
}

/// Ordered entities to evaluate for one request. Built once, consumed by a
/// single run.
#[derive(Clone, Debug)]
pub struct Plan {
    reason: ChangeReason,
    entries: Vec<PlanEntry>,
    is_time_step: bool,
    message: String,
}

impl Plan {
    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|entry| entry.entity_id).collect()
    }

    pub fn is_time_step(&self) -> bool {
        self.is_time_step
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Runs on the caller's thread rather than in the background.
    pub fn runs_inline(&self) -> bool {
        self.is_time_step || self.reason.is_synchronous()
    }
}

pub struct Planner;

impl Planner {
    pub fn plan(
        reason: ChangeReason,
        active_entity: Option<EntityId>,
        network: &DependencyNetwork,
        message: &str,
    ) -> Plan {
        let (nodes, is_time_step) = match reason.scope() {
            PlanScope::Subtree => {
                let root = active_entity
                    .and_then(|id| network.by_entity(&id))
                    .map(|node| node.id);
                match root {
                    Some(root) => (network.downstream_of(root), false),
                    None => (Vec::new(), false),
                }
            }
            PlanScope::Scene => (network.order().to_vec(), false),
            PlanScope::Time => (network.downstream_of(NetworkNodeId::TIME), true),
        };

        let entries: Vec<PlanEntry> = nodes
            .into_iter()
            .filter_map(|id| {
                let entity_id = network.node(id)?.entity_id()?;
                Some(PlanEntry {
                    network_node: id,
                    entity_id,
                })
            })
            .collect();

        debug!(
            %reason,
            entries = entries.len(),
            is_time_step,
            message,
            "Plan built"
        );

        Plan {
            reason,
            entries,
            is_time_step,
            message: message.to_string(),
        }
    }
}
