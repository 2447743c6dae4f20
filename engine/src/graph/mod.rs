use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use common::key_index_vec::{KeyIndexKey, KeyIndexVec};
use common::{id_type, is_debug};
use hashbrown::HashSet;

use crate::common::any_state::AnyState;
use crate::data::{DynamicValue, StaticValue};
use crate::error::{ConnectionError, Error, Result};
use crate::operator::{Operator, Parameters, SocketDef};
use crate::operators::OperatorRegistry;

mod evaluate;

pub use evaluate::{ExecutedNode, GraphRun};

id_type!(NodeId);

/// One end of a link: a node and a socket index on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketRef {
    pub node_id: NodeId,
    pub socket_idx: usize,
}

impl SocketRef {
    pub fn new(node_id: NodeId, socket_idx: usize) -> Self {
        Self {
            node_id,
            socket_idx,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Input {
    pub def: SocketDef,
    /// Upstream outputs feeding this input.
    pub links: Vec<SocketRef>,
}

#[derive(Clone, Debug)]
pub struct Output {
    pub def: SocketDef,
    /// Downstream inputs this output feeds.
    pub links: Vec<SocketRef>,
}

pub struct Node {
    pub id: NodeId,
    pub name: String,

    operator: Box<dyn Operator>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    parameters: Parameters,

    needs_execution: bool,
    output_values: Option<Vec<DynamicValue>>,
    execution_count: u64,
    self_time: f64,
    cumulative_time: f64,
    warnings: Vec<String>,
    state: AnyState,

    last_frame: Option<i64>,
    last_run: Option<u64>,
    failed_run: Option<u64>,
}

impl Node {
    fn new(name: String, operator: Box<dyn Operator>) -> Self {
        let inputs = operator
            .inputs()
            .into_iter()
            .map(|def| Input {
                def,
                links: Vec::new(),
            })
            .collect();
        let outputs = operator
            .outputs()
            .into_iter()
            .map(|def| Output {
                def,
                links: Vec::new(),
            })
            .collect();

        Self {
            id: NodeId::unique(),
            name,
            operator,
            inputs,
            outputs,
            parameters: Parameters::default(),
            needs_execution: true,
            output_values: None,
            execution_count: 0,
            self_time: 0.0,
            cumulative_time: 0.0,
            warnings: Vec::new(),
            state: AnyState::default(),
            last_frame: None,
            last_run: None,
            failed_run: None,
        }
    }

    pub fn type_name(&self) -> &str {
        self.operator.type_name()
    }

    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&StaticValue> {
        self.parameters.get(name)
    }

    pub fn needs_execution(&self) -> bool {
        self.needs_execution
    }

    /// No valid output values are held: never executed, or released.
    pub fn cache_is_invalid(&self) -> bool {
        self.output_values.is_none()
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Seconds spent in this node's own operator on its last execution.
    pub fn self_time(&self) -> f64 {
        self.self_time
    }

    /// Self time plus the cumulative time of direct upstream nodes that ran in
    /// the same pass.
    pub fn cumulative_time(&self) -> f64 {
        self.cumulative_time
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn output_value(&self, idx: usize) -> Option<&DynamicValue> {
        self.output_values.as_ref().and_then(|values| values.get(idx))
    }

    pub fn state(&self) -> &AnyState {
        &self.state
    }

    pub fn last_frame(&self) -> Option<i64> {
        self.last_frame
    }

    fn wants_execute(&self) -> bool {
        self.needs_execution || self.output_values.is_none() || self.operator.executes_every_run()
    }

    fn is_time_dependent(&self) -> bool {
        self.operator.depends_on_time() || self.operator.has_animation(&self.parameters)
    }

    fn release(&mut self) {
        self.needs_execution = true;
        self.output_values = None;
        self.operator.release_buffers();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name())
            .field("needs_execution", &self.needs_execution)
            .field("execution_count", &self.execution_count)
            .finish_non_exhaustive()
    }
}

impl KeyIndexKey<NodeId> for Node {
    fn key(&self) -> &NodeId {
        &self.id
    }
}

type CreateFn = dyn Fn(&str) -> Option<Box<dyn Operator>> + Send + Sync;
type DestroyFn = dyn Fn(&Node) + Send + Sync;

/// Creation and teardown hooks every node of a graph goes through.
#[derive(Clone)]
pub struct NodeFactory {
    create: Arc<CreateFn>,
    destroy: Option<Arc<DestroyFn>>,
}

impl NodeFactory {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&str) -> Option<Box<dyn Operator>> + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            destroy: None,
        }
    }

    pub fn from_registry(registry: Arc<OperatorRegistry>) -> Self {
        Self::new(move |type_name| registry.create(type_name))
    }

    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&Node) + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(destroy));
        self
    }

    fn destroy(&self, node: &Node) {
        if let Some(destroy) = &self.destroy {
            destroy(node);
        }
    }
}

impl fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFactory")
            .field("has_destroy", &self.destroy.is_some())
            .finish_non_exhaustive()
    }
}

/// An entity's node arena: nodes in creation order, links stored on both
/// ends, and a cached topological order.
#[derive(Debug)]
pub struct Graph {
    nodes: KeyIndexVec<NodeId, Node>,
    factory: NodeFactory,
    order: Vec<NodeId>,
    needs_reordering: bool,
    output: Option<NodeId>,

    pub entry: AnyState,
    pub side_data: AnyState,
}

impl Graph {
    pub fn new(factory: NodeFactory) -> Self {
        Self {
            nodes: KeyIndexVec::default(),
            factory,
            order: Vec::new(),
            needs_reordering: false,
            output: None,
            entry: AnyState::default(),
            side_data: AnyState::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.by_key(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    fn node_ref(&self, id: &NodeId) -> Result<&Node> {
        self.nodes.by_key(id).ok_or(Error::NodeNotFound(*id))
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes.by_key_mut(id).ok_or(Error::NodeNotFound(*id))
    }

    pub fn create_node(&mut self, type_name: &str, name: impl Into<String>) -> Result<NodeId> {
        let operator = (self.factory.create)(type_name)
            .ok_or_else(|| Error::UnknownOperator(type_name.to_string()))?;
        let node = Node::new(name.into(), operator);
        let id = node.id;

        let inserted = self.nodes.push(node);
        assert!(inserted);
        self.needs_reordering = true;

        Ok(id)
    }

    /// Unlinks and destroys a node. Former downstream nodes lose an input and
    /// are marked for execution.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        let node = self.nodes.remove_by_key(id).ok_or(Error::NodeNotFound(*id))?;

        for input in node.inputs.iter() {
            for upstream in input.links.iter() {
                if let Some(source) = self.nodes.by_key_mut(&upstream.node_id) {
                    source.outputs[upstream.socket_idx]
                        .links
                        .retain(|link| link.node_id != *id);
                }
            }
        }

        for output in node.outputs.iter() {
            for downstream in output.links.iter() {
                if let Some(target) = self.nodes.by_key_mut(&downstream.node_id) {
                    target.inputs[downstream.socket_idx]
                        .links
                        .retain(|link| link.node_id != *id);
                    target.needs_execution = true;
                }
            }
        }

        if self.output == Some(*id) {
            self.output = None;
        }
        self.needs_reordering = true;
        self.factory.destroy(&node);

        self.validate();
        Ok(())
    }

    /// Links output `from` to input `to`.
    pub fn connect(&mut self, from: SocketRef, to: SocketRef) -> Result<()> {
        let source = self.node_ref(&from.node_id)?;
        let target = self.node_ref(&to.node_id)?;

        let output = source
            .outputs
            .get(from.socket_idx)
            .ok_or(ConnectionError::SocketOutOfRange)?;
        let input = target
            .inputs
            .get(to.socket_idx)
            .ok_or(ConnectionError::SocketOutOfRange)?;

        if !input.def.data_type.accepts(&output.def.data_type) {
            return Err(ConnectionError::TypeMismatch.into());
        }
        if input.links.contains(&from) {
            return Err(ConnectionError::AlreadyConnected.into());
        }
        if !input.def.multi && !input.links.is_empty() {
            return Err(ConnectionError::InputOccupied.into());
        }
        if self.reaches(&to.node_id, &from.node_id) {
            return Err(ConnectionError::WouldCreateCycle.into());
        }

        self.node_mut(&from.node_id)?.outputs[from.socket_idx]
            .links
            .push(to);
        let target = self.node_mut(&to.node_id)?;
        target.inputs[to.socket_idx].links.push(from);
        target.needs_execution = true;

        self.needs_reordering = true;
        Ok(())
    }

    pub fn disconnect(&mut self, from: SocketRef, to: SocketRef) -> Result<()> {
        let target = self.node_mut(&to.node_id)?;
        let input = target
            .inputs
            .get_mut(to.socket_idx)
            .ok_or(ConnectionError::SocketOutOfRange)?;
        let before = input.links.len();
        input.links.retain(|link| *link != from);
        if input.links.len() == before {
            return Err(ConnectionError::NotConnected.into());
        }
        target.needs_execution = true;

        let source = self.node_mut(&from.node_id)?;
        source.outputs[from.socket_idx]
            .links
            .retain(|link| *link != to);

        self.needs_reordering = true;
        Ok(())
    }

    /// Stores a parameter and marks the node for execution when it changed.
    pub fn set_parameter(
        &mut self,
        id: &NodeId,
        name: &str,
        value: impl Into<StaticValue>,
    ) -> Result<()> {
        let value = value.into();
        let node = self.node_mut(id)?;

        if node.parameters.get(name) == Some(&value) {
            return Ok(());
        }
        node.parameters.insert(name.to_string(), value);
        node.needs_execution = true;

        Ok(())
    }

    /// Designates the node whose outputs represent the graph's result.
    /// `None` falls back to every sink node.
    pub fn set_output(&mut self, id: Option<NodeId>) -> Result<()> {
        if let Some(id) = &id {
            self.node_ref(id)?;
        }
        self.output = id;
        Ok(())
    }

    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Nodes evaluation is requested for: the designated output, or every
    /// node without downstream links.
    pub fn output_nodes(&self) -> Vec<NodeId> {
        match self.output {
            Some(id) => vec![id],
            None => self
                .nodes
                .iter()
                .filter(|node| node.outputs.iter().all(|output| output.links.is_empty()))
                .map(|node| node.id)
                .collect(),
        }
    }

    /// The graph's result value at `socket_idx` of its first output node.
    pub fn output_value(&self, socket_idx: usize) -> Option<&DynamicValue> {
        let id = self.output_nodes().into_iter().next()?;
        self.nodes.by_key(&id)?.output_value(socket_idx)
    }

    pub fn needs_reordering(&self) -> bool {
        self.needs_reordering
    }

    /// Recomputes the cached node order. Producers come before consumers;
    /// otherwise creation order is kept.
    pub fn topological_sort(&mut self) -> Result<()> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.inputs.iter().map(|input| input.links.len()).sum())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(idx)) = ready.pop() {
            let node = &self.nodes[idx];
            order.push(node.id);

            for link in node.outputs.iter().flat_map(|output| output.links.iter()) {
                let Some(target_idx) = self.nodes.index_of_key(&link.node_id) else {
                    continue;
                };
                in_degree[target_idx] -= 1;
                if in_degree[target_idx] == 0 {
                    ready.push(Reverse(target_idx));
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .position(|degree| *degree > 0)
                .map(|idx| self.nodes[idx].id)
                .unwrap_or_default();
            return Err(Error::CycleDetected { node_id: stuck });
        }

        self.order = order;
        self.needs_reordering = false;
        Ok(())
    }

    /// The cached order. Fails when the structure changed since the last sort.
    pub fn ordered_nodes(&self) -> Result<&[NodeId]> {
        if self.needs_reordering {
            return Err(Error::StaleOrder);
        }
        Ok(&self.order)
    }

    pub fn mark_needs_execution(&mut self, id: &NodeId) -> Result<()> {
        self.node_mut(id)?.needs_execution = true;
        Ok(())
    }

    pub fn mark_all(&mut self) {
        self.nodes
            .iter_mut()
            .for_each(|node| node.needs_execution = true);
    }

    /// Marks nodes that depend on time or carry animation. Returns how many
    /// were marked.
    pub fn mark_time_dependent(&mut self) -> usize {
        let mut marked = 0;
        for node in self.nodes.iter_mut() {
            if node.is_time_dependent() {
                node.needs_execution = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn time_dependent_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.is_time_dependent())
            .map(|node| node.id)
            .collect()
    }

    /// Forces `id` and everything reachable through its outputs to execute
    /// again, releasing their held results.
    pub fn invalidate_downstream(&mut self, id: &NodeId) -> Result<usize> {
        self.node_ref(id)?;

        let mut affected = self.downstream_of(id);
        affected.insert(0, *id);
        for node_id in affected.iter() {
            if let Some(node) = self.nodes.by_key_mut(node_id) {
                node.release();
            }
        }

        Ok(affected.len())
    }

    /// Every node reachable through output links of `id`, excluding `id`.
    pub fn downstream_of(&self, id: &NodeId) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![*id];
        let mut result = Vec::new();

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.by_key(&current) else {
                continue;
            };
            for link in node.outputs.iter().flat_map(|output| output.links.iter()) {
                if visited.insert(link.node_id) {
                    result.push(link.node_id);
                    stack.push(link.node_id);
                }
            }
        }

        result
    }

    /// Stale nodes the next evaluation would execute, used as the progress
    /// estimate before a run.
    pub fn pending_node_count(&self) -> usize {
        let required = self.required_ids();
        self.nodes
            .iter()
            .filter(|node| required.contains(&node.id) && node.wants_execute())
            .count()
    }

    fn reaches(&self, from: &NodeId, to: &NodeId) -> bool {
        from == to || self.downstream_of(from).contains(to)
    }

    /// Output nodes plus all their transitive upstream nodes.
    fn required_ids(&self) -> HashSet<NodeId> {
        let mut required: HashSet<NodeId> = HashSet::new();
        let mut stack = self.output_nodes();

        while let Some(id) = stack.pop() {
            if !required.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.by_key(&id) else {
                continue;
            };
            for link in node.inputs.iter().flat_map(|input| input.links.iter()) {
                stack.push(link.node_id);
            }
        }

        required
    }

    fn validate(&self) {
        if !is_debug() {
            return;
        }

        for node in self.nodes.iter() {
            for (input_idx, input) in node.inputs.iter().enumerate() {
                for link in input.links.iter() {
                    let source = self
                        .nodes
                        .by_key(&link.node_id)
                        .expect("input linked to a missing node");
                    assert!(
                        source.outputs[link.socket_idx]
                            .links
                            .contains(&SocketRef::new(node.id, input_idx))
                    );
                }
            }
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for node in self.nodes.iter() {
            self.factory.destroy(node);
        }
    }
}
