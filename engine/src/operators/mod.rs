//! Operator registry and the built-in operators.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::operator::Operator;

mod array;
mod basic;
mod file;
mod import;
mod time;

pub use array::{Range, ScaleArray};
pub use basic::{Add, Constant, Multiply};
pub use file::FileSize;
pub use import::ImportEntity;
pub use time::{Accumulate, Keyframes, Time};

type Constructor = dyn Fn() -> Box<dyn Operator> + Send + Sync;

/// Named operator constructors. Graphs create nodes by type name through a
/// registry-backed [`crate::graph::NodeFactory`].
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    constructors: HashMap<String, Arc<Constructor>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Constant::TYPE_NAME, || Box::new(Constant));
        registry.register(Add::TYPE_NAME, || Box::new(Add));
        registry.register(Multiply::TYPE_NAME, || Box::new(Multiply));
        registry.register(Time::TYPE_NAME, || Box::new(Time));
        registry.register(Keyframes::TYPE_NAME, || Box::new(Keyframes));
        registry.register(Accumulate::TYPE_NAME, || Box::new(Accumulate));
        registry.register(ImportEntity::TYPE_NAME, || Box::new(ImportEntity));
        registry.register(Range::TYPE_NAME, || Box::new(Range));
        registry.register(ScaleArray::TYPE_NAME, || Box::new(ScaleArray));
        registry.register(FileSize::TYPE_NAME, || Box::new(FileSize));
        registry
    }

    /// Registers `constructor` under `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.to_string(), Arc::new(constructor));
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn Operator>> {
        self.constructors
            .get(type_name)
            .map(|constructor| constructor())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("type_names", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests;
