use std::sync::Arc;

use common::id_type;
use common::key_index_vec::{KeyIndexKey, KeyIndexVec};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::info;

use crate::data::DynamicValue;
use crate::error::{Error, Result};
use crate::graph::Graph;

id_type!(EntityId);

/// A scene object owning one node graph.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    graph: Mutex<Graph>,
}

impl Entity {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            id: EntityId::unique(),
            name: name.into(),
            graph: Mutex::new(graph),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    pub fn try_graph(&self) -> Option<MutexGuard<'_, Graph>> {
        self.graph.try_lock()
    }

    /// The graph's current result at `socket_idx`. `None` when the graph is
    /// locked by an evaluation or has no valid result.
    pub fn output_value(&self, socket_idx: usize) -> Option<DynamicValue> {
        self.try_graph()?.output_value(socket_idx).cloned()
    }
}

/// Read access to the scene's entities, as seen by the dependency compiler
/// and by operators importing other entities' results.
pub trait EntityDatabase: Send + Sync {
    /// Entities in creation order.
    fn entities(&self) -> Vec<Arc<Entity>>;

    fn by_id(&self, id: &EntityId) -> Option<Arc<Entity>>;

    fn by_name(&self, name: &str) -> Option<Arc<Entity>>;
}

struct SceneEntry(Arc<Entity>);

impl KeyIndexKey<EntityId> for SceneEntry {
    fn key(&self) -> &EntityId {
        &self.0.id
    }
}

#[derive(Default)]
pub struct Scene {
    entities: RwLock<KeyIndexVec<EntityId, SceneEntry>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&self, name: impl Into<String>, graph: Graph) -> Result<Arc<Entity>> {
        let name = name.into();
        let mut entities = self.entities.write();

        if entities.iter().any(|entry| entry.0.name == name) {
            return Err(Error::DuplicateEntityName(name));
        }

        let entity = Arc::new(Entity::new(name, graph));
        entities.push(SceneEntry(Arc::clone(&entity)));
        info!(entity = entity.name(), id = %entity.id(), "Entity added");

        Ok(entity)
    }

    pub fn remove_entity(&self, id: &EntityId) -> Result<Arc<Entity>> {
        let removed = self
            .entities
            .write()
            .remove_by_key(id)
            .ok_or(Error::EntityNotFound(*id))?;
        info!(entity = removed.0.name(), "Entity removed");

        Ok(removed.0)
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityDatabase for Scene {
    fn entities(&self) -> Vec<Arc<Entity>> {
        self.entities
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.0))
            .collect()
    }

    fn by_id(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.entities
            .read()
            .by_key(id)
            .map(|entry| Arc::clone(&entry.0))
    }

    fn by_name(&self, name: &str) -> Option<Arc<Entity>> {
        self.entities
            .read()
            .iter()
            .find(|entry| entry.0.name == name)
            .map(|entry| Arc::clone(&entry.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_factory;

    #[test]
    fn names_are_unique_and_order_is_kept() -> anyhow::Result<()> {
        let scene = Scene::new();
        let a = scene.add_entity("A", Graph::new(test_factory()))?;
        let b = scene.add_entity("B", Graph::new(test_factory()))?;

        assert!(matches!(
            scene.add_entity("A", Graph::new(test_factory())),
            Err(Error::DuplicateEntityName(_))
        ));

        let names: Vec<String> = scene
            .entities()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(scene.by_name("B").unwrap().id(), b.id());

        scene.remove_entity(&a.id())?;
        assert!(scene.by_id(&a.id()).is_none());
        assert!(scene.remove_entity(&a.id()).is_err());
        assert_eq!(scene.len(), 1);

        Ok(())
    }

    #[test]
    fn locked_graph_has_no_visible_output() -> anyhow::Result<()> {
        let scene = Scene::new();
        let entity = scene.add_entity("A", Graph::new(test_factory()))?;

        let _guard = entity.graph();
        assert!(entity.output_value(0).is_none());

        Ok(())
    }
}
