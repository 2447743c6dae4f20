pub use crate::common::any_state::AnyState;
pub use crate::config::EngineConfig;
pub use crate::context::{ExecutionContext, RenderRect, TimeRange};
pub use crate::data::{DataType, DynamicValue, StaticValue};
pub use crate::entity::{Entity, EntityDatabase, EntityId, Scene};
pub use crate::error::{ConnectionError, Error, Result};
pub use crate::evaluator::{EvaluationRequest, Evaluator};
pub use crate::execution_stats::{ExecutedNodeStats, ExecutionStats, NodeError};
pub use crate::executor::{Executor, RunHandle};
pub use crate::file_manager::{FileCache, FileManager};
pub use crate::graph::{Graph, Node, NodeFactory, NodeId, SocketRef};
pub use crate::network::{
    DependencyCompilationError, DependencyCompiler, DependencyNetwork, NetworkNodeId,
};
pub use crate::operator::{Operator, OperatorContext, Outcome, Parameters, SocketDef, TimeStep};
pub use crate::operators::OperatorRegistry;
pub use crate::plan::{ChangeReason, Plan, Planner};
pub use crate::progress::{EvaluationEvent, NotificationBus, ProgressCoordinator, RunState};
