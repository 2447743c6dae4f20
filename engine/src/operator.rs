//! The capability interface every node operator implements, and the view of
//! the world an operator gets while it runs.

use hashbrown::HashMap;

use crate::common::any_state::AnyState;
use crate::context::{ExecutionContext, RenderRect};
use crate::data::{DataType, DynamicValue, StaticValue};
use crate::entity::EntityDatabase;
use crate::file_manager::FileManager;
use crate::graph::NodeId;
use crate::network::{DependencyCompilationError, DependencyCompiler, NetworkNodeId};

pub type Parameters = HashMap<String, StaticValue>;

static NO_VALUE: DynamicValue = DynamicValue::None;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketDef {
    pub name: String,
    pub data_type: DataType,
    /// Inputs only: accepts more than one incoming link.
    pub multi: bool,
}

impl SocketDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            multi: false,
        }
    }

    pub fn multi(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            multi: true,
            ..Self::new(name, data_type)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// How the current frame relates to the frame a node last executed at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeStep {
    /// First execution, or time jumped. Accumulated state starts over.
    #[default]
    Reset,
    /// Exactly one frame after the previous execution.
    Advance,
    /// Same frame as the previous execution.
    Hold,
}

impl TimeStep {
    pub fn between(last_frame: Option<i64>, frame: i64) -> Self {
        match last_frame {
            Some(last) if last == frame => TimeStep::Hold,
            Some(last) if last.checked_add(1) == Some(frame) => TimeStep::Advance,
            _ => TimeStep::Reset,
        }
    }
}

pub trait Operator: Send {
    fn type_name(&self) -> &str;

    fn inputs(&self) -> Vec<SocketDef> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<SocketDef> {
        Vec::new()
    }

    /// Computes outputs from inputs. Outputs are written into a fresh buffer
    /// and only become visible downstream when this returns `Success` and the
    /// run was not interrupted meanwhile.
    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome;

    fn depends_on_time(&self) -> bool {
        false
    }

    fn has_animation(&self, _parameters: &Parameters) -> bool {
        false
    }

    /// Runs on every pass that reaches it, regardless of staleness.
    fn executes_every_run(&self) -> bool {
        false
    }

    /// Registers cross-entity edges this operator needs, e.g. reading another
    /// entity's output.
    fn declare_dependencies(
        &self,
        _parameters: &Parameters,
        _compiler: &mut DependencyCompiler<'_>,
        _network_node: NetworkNodeId,
    ) -> Result<(), DependencyCompilationError> {
        Ok(())
    }

    fn release_buffers(&mut self) {}
}

pub struct OperatorContext<'a> {
    pub(crate) exec: &'a ExecutionContext,
    pub(crate) node_id: NodeId,
    pub(crate) inputs: &'a [Vec<DynamicValue>],
    pub(crate) outputs: &'a mut [DynamicValue],
    pub(crate) parameters: &'a Parameters,
    pub(crate) state: &'a mut AnyState,
    pub(crate) warnings: &'a mut Vec<String>,
    pub(crate) time_step: TimeStep,
    pub(crate) entry: &'a AnyState,
    pub(crate) side_data: &'a AnyState,
}

impl<'a> OperatorContext<'a> {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Value on the first link of input `idx`, or `None` when unlinked.
    pub fn input(&self, idx: usize) -> &DynamicValue {
        self.inputs
            .get(idx)
            .and_then(|values| values.first())
            .unwrap_or(&NO_VALUE)
    }

    /// All values arriving at a multi-link input, in link order.
    pub fn input_values(&self, idx: usize) -> &[DynamicValue] {
        self.inputs.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_output(&mut self, idx: usize, value: impl Into<DynamicValue>) {
        assert!(idx < self.outputs.len(), "output index out of range");
        self.outputs[idx] = value.into();
    }

    pub fn parameter(&self, name: &str) -> Option<&StaticValue> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    pub fn state(&mut self) -> &mut AnyState {
        self.state
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn time_step(&self) -> TimeStep {
        self.time_step
    }

    pub fn frame(&self) -> i64 {
        self.exec.frame()
    }

    pub fn seconds(&self) -> f64 {
        self.exec.seconds()
    }

    pub fn playing(&self) -> bool {
        self.exec.playing()
    }

    pub fn render_rect(&self) -> RenderRect {
        self.exec.render_rect()
    }

    pub fn parallel_chunk_size(&self) -> usize {
        self.exec.parallel_chunk_size()
    }

    pub fn entities(&self) -> &dyn EntityDatabase {
        self.exec.entities()
    }

    pub fn files(&self) -> &dyn FileManager {
        self.exec.files()
    }

    /// Long-running operators poll this and bail out early.
    pub fn interrupted(&self) -> bool {
        self.exec.interrupted()
    }

    /// Adds `delta` percent of this node's work from any worker thread.
    pub fn report_parallel_progress(&self, delta: f32) {
        self.exec.coordinator().report_parallel_progress(delta);
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        self.exec
    }

    /// Context injected by the owner of the graph.
    pub fn entry(&self) -> &AnyState {
        self.entry
    }

    pub fn side_data(&self) -> &AnyState {
        self.side_data
    }
}

#[cfg(test)]
mod tests {
    use super::TimeStep;

    #[test]
    fn time_step_continuity() {
        assert_eq!(TimeStep::between(None, 0), TimeStep::Reset);
        assert_eq!(TimeStep::between(Some(4), 5), TimeStep::Advance);
        assert_eq!(TimeStep::between(Some(5), 5), TimeStep::Hold);
        assert_eq!(TimeStep::between(Some(i64::MAX), 0), TimeStep::Reset);
        assert_eq!(TimeStep::between(Some(i64::MAX), i64::MAX), TimeStep::Hold);
        assert_eq!(TimeStep::between(Some(5), 4), TimeStep::Reset);
        assert_eq!(TimeStep::between(Some(1), 9), TimeStep::Reset);
    }
}
