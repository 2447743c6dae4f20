//! Cross-entity dependency network.
//!
//! One network-node per entity plus a distinguished time node at index 0.
//! Edges come from operators: time-dependent or animated nodes wire the time
//! node into their entity, and `declare_dependencies` wires other entities.
//! The network is rebuilt from scratch on every compile and never patched.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::entity::{EntityDatabase, EntityId};
use crate::graph::NodeId;


#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyCompilationError {
    #[error("Entity {0} already has a network node")]
    DuplicateEntity(EntityId),
    #[error("Dependency on missing entity '{0}'")]
    MissingEntity(String),
    #[error("Entity '{0}' cannot depend on itself")]
    SelfDependency(String),
    #[error("Network node {0} does not exist")]
    UnknownNetworkNode(usize),
    #[error("Dependency cycle between entities involving '{0}'")]
    Cycle(String),
}

type CompileResult<T> = std::result::Result<T, DependencyCompilationError>;

/// Index of a network node. Time is always 0, entities follow in creation
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkNodeId(usize);

impl NetworkNodeId {
    pub const TIME: NetworkNodeId = NetworkNodeId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkNodeKind {
    Time,
    Entity(EntityId),
}

/// An inner node to re-run when `source` produced new results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub source: NetworkNodeId,
    pub node_id: NodeId,
}

#[derive(Clone, Debug)]
pub struct NetworkNode {
    pub id: NetworkNodeId,
    pub kind: NetworkNodeKind,
    /// Network nodes this one depends on.
    pub entrees: Vec<NetworkNodeId>,
    /// Network nodes depending on this one.
    pub sorties: Vec<NetworkNodeId>,
    pub triggers: Vec<Trigger>,
}

impl NetworkNode {
    fn new(id: NetworkNodeId, kind: NetworkNodeKind) -> Self {
        Self {
            id,
            kind,
            entrees: Vec::new(),
            sorties: Vec::new(),
            triggers: Vec::new(),
        }
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        match self.kind {
            NetworkNodeKind::Time => None,
            NetworkNodeKind::Entity(id) => Some(id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DependencyNetwork {
    nodes: Vec<NetworkNode>,
    by_entity: HashMap<EntityId, NetworkNodeId>,
    order: Vec<NetworkNodeId>,
}

impl Default for DependencyNetwork {
    fn default() -> Self {
        Self {
            nodes: vec![NetworkNode::new(NetworkNodeId::TIME, NetworkNodeKind::Time)],
            by_entity: HashMap::new(),
            order: vec![NetworkNodeId::TIME],
        }
    }
}

impl DependencyNetwork {
    pub fn time_node(&self) -> &NetworkNode {
        &self.nodes[NetworkNodeId::TIME.0]
    }

    pub fn node(&self, id: NetworkNodeId) -> Option<&NetworkNode> {
        self.nodes.get(id.0)
    }

    pub fn by_entity(&self, entity_id: &EntityId) -> Option<&NetworkNode> {
        self.by_entity
            .get(entity_id)
            .and_then(|id| self.nodes.get(id.0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NetworkNode> {
        self.nodes.iter()
    }

    pub fn has_edge(&self, from: NetworkNodeId, to: NetworkNodeId) -> bool {
        self.node(to).is_some_and(|node| node.entrees.contains(&from))
    }

    /// All network nodes in dependency order, ties by creation order.
    pub fn order(&self) -> &[NetworkNodeId] {
        &self.order
    }

    /// `root` and every network node reachable through sorties, in
    /// dependency order.
    pub fn downstream_of(&self, root: NetworkNodeId) -> Vec<NetworkNodeId> {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(slot) = reachable.get_mut(id.0) else {
                continue;
            };
            if *slot {
                continue;
            }
            *slot = true;
            stack.extend(self.nodes[id.0].sorties.iter().copied());
        }

        self.order
            .iter()
            .copied()
            .filter(|id| reachable[id.0])
            .collect()
    }

    fn push_node(&mut self, kind: NetworkNodeKind) -> NetworkNodeId {
        let id = NetworkNodeId(self.nodes.len());
        self.nodes.push(NetworkNode::new(id, kind));
        id
    }

    fn add_edge(&mut self, from: NetworkNodeId, to: NetworkNodeId) -> CompileResult<()> {
        if from.0 >= self.nodes.len() {
            return Err(DependencyCompilationError::UnknownNetworkNode(from.0));
        }
        if to.0 >= self.nodes.len() {
            return Err(DependencyCompilationError::UnknownNetworkNode(to.0));
        }

        if !self.nodes[to.0].entrees.contains(&from) {
            self.nodes[to.0].entrees.push(from);
            self.nodes[from.0].sorties.push(to);
        }
        Ok(())
    }

    /// Kahn's algorithm with a min-heap so ties keep creation order. On a
    /// cycle, returns the index of a node on or behind it.
    fn compute_order(&mut self) -> Result<(), usize> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.entrees.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(NetworkNodeId(idx));
            for sortie in self.nodes[idx].sorties.iter() {
                in_degree[sortie.0] -= 1;
                if in_degree[sortie.0] == 0 {
                    ready.push(Reverse(sortie.0));
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .position(|degree| *degree > 0)
                .unwrap_or_default();
            return Err(stuck);
        }

        self.order = order;
        Ok(())
    }
}

/// Builds a [`DependencyNetwork`] from the current scene. Operators receive
/// it in `declare_dependencies` to register what they read.
pub struct DependencyCompiler<'a> {
    db: &'a dyn EntityDatabase,
    network: DependencyNetwork,
    current_node: Option<NodeId>,
}

impl<'a> DependencyCompiler<'a> {
    pub(crate) fn new(db: &'a dyn EntityDatabase) -> Self {
        Self {
            db,
            network: DependencyNetwork::default(),
            current_node: None,
        }
    }

    pub fn compile(db: &'a dyn EntityDatabase) -> CompileResult<DependencyNetwork> {
        let mut compiler = DependencyCompiler::new(db);

        let entities = db.entities();
        for entity in entities.iter() {
            compiler.add_entity(entity.id())?;
        }

        for entity in entities.iter() {
            let network_node = compiler.network_node_of(&entity.id())?;
            let graph = entity.graph();

            for node in graph.nodes() {
                compiler.current_node = Some(node.id);

                if node.operator().depends_on_time()
                    || node.operator().has_animation(node.parameters())
                {
                    compiler.depend_on_time(network_node)?;
                }

                node.operator()
                    .declare_dependencies(node.parameters(), &mut compiler, network_node)?;
            }
            compiler.current_node = None;
        }

        if let Err(stuck) = compiler.network.compute_order() {
            return Err(DependencyCompilationError::Cycle(compiler.entity_name(stuck)));
        }

        debug!(
            network_nodes = compiler.network.len(),
            time_dependents = compiler.network.time_node().sorties.len(),
            "Dependency network compiled"
        );

        Ok(compiler.network)
    }

    /// Creates the network node for an entity. A second node for the same
    /// entity is an error.
    pub fn add_entity(&mut self, entity_id: EntityId) -> CompileResult<NetworkNodeId> {
        if self.network.by_entity.contains_key(&entity_id) {
            return Err(DependencyCompilationError::DuplicateEntity(entity_id));
        }

        let id = self.network.push_node(NetworkNodeKind::Entity(entity_id));
        self.network.by_entity.insert(entity_id, id);
        Ok(id)
    }

    pub fn network_node_of(&self, entity_id: &EntityId) -> CompileResult<NetworkNodeId> {
        self.network
            .by_entity
            .get(entity_id)
            .copied()
            .ok_or_else(|| DependencyCompilationError::MissingEntity(entity_id.to_string()))
    }

    pub fn depend_on_time(&mut self, target: NetworkNodeId) -> CompileResult<()> {
        self.add_dependency(NetworkNodeId::TIME, target)
    }

    /// Makes `target` depend on the entity called `source_name`.
    pub fn depend_on_entity(
        &mut self,
        source_name: &str,
        target: NetworkNodeId,
    ) -> CompileResult<()> {
        let source_entity = self
            .db
            .by_name(source_name)
            .ok_or_else(|| DependencyCompilationError::MissingEntity(source_name.to_string()))?;
        let source = self
            .network
            .by_entity
            .get(&source_entity.id())
            .copied()
            .ok_or_else(|| DependencyCompilationError::MissingEntity(source_name.to_string()))?;

        if source == target {
            return Err(DependencyCompilationError::SelfDependency(
                source_name.to_string(),
            ));
        }

        self.add_dependency(source, target)
    }

    /// Adds the edge `source -> target` and records the inner node currently
    /// being visited as the one to re-run when `source` changes.
    pub fn add_dependency(
        &mut self,
        source: NetworkNodeId,
        target: NetworkNodeId,
    ) -> CompileResult<()> {
        self.network.add_edge(source, target)?;

        if let Some(node_id) = self.current_node {
            let trigger = Trigger { source, node_id };
            let triggers = &mut self.network.nodes[target.0].triggers;
            if !triggers.contains(&trigger) {
                triggers.push(trigger);
            }
        }

        Ok(())
    }

    fn entity_name(&self, idx: usize) -> String {
        self.network
            .node(NetworkNodeId(idx))
            .and_then(NetworkNode::entity_id)
            .and_then(|id| self.db.by_id(&id))
            .map(|entity| entity.name().to_string())
            .unwrap_or_else(|| format!("network node {}", idx))
    }
}
