use thiserror::Error;

use crate::entity::EntityId;
use crate::graph::NodeId;
use crate::network::DependencyCompilationError;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("socket index out of range")]
    SocketOutOfRange,
    #[error("incompatible socket types")]
    TypeMismatch,
    #[error("input already has a link")]
    InputOccupied,
    #[error("link would create a cycle")]
    WouldCreateCycle,
    #[error("sockets are already linked")]
    AlreadyConnected,
    #[error("sockets are not linked")]
    NotConnected,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown operator type '{0}'")]
    UnknownOperator(String),
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),
    #[error("Invalid connection: {0}")]
    InvalidConnection(#[from] ConnectionError),
    #[error("Cycle detected in graph at node {node_id}")]
    CycleDetected { node_id: NodeId },
    #[error("Node order is stale; topological_sort must run first")]
    StaleOrder,
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("Entity name '{0}' is already in use")]
    DuplicateEntityName(String),
    #[error(transparent)]
    Dependency(#[from] DependencyCompilationError),
    #[error("Background evaluation failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
