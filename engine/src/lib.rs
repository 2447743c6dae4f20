//! Dependency-driven incremental evaluation for procedural node graphs.
//!
//! Entities own node graphs. A change event compiles the cross-entity
//! [`network::DependencyNetwork`], the [`plan::Planner`] picks the entities
//! to revisit, and the [`executor::Executor`] runs them, re-executing only
//! stale nodes.

pub mod common;
pub mod config;
pub mod context;
pub mod data;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod execution_stats;
pub mod executor;
pub mod file_manager;
pub mod graph;
pub mod network;
pub mod operator;
pub mod operators;
pub mod plan;
pub mod prelude;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;
