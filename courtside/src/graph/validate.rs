//! Graph validation - cycle and duplicate-name detection
//!
//! Names are the cache key, so a task reachable under a name that is also
//! one of its ancestors would wait on its own resolution forever. Checked
//! once before the first resolve.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{Task, TaskRef};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Duplicate task name: {0} names two different tasks")]
    DuplicateName(String),
}

/// Validate the graph reachable from `root`
pub fn validate_graph(root: &TaskRef) -> Result<(), GraphError> {
    dependency_order(root).map(|_| ())
}

/// Every task reachable from `root`, dependencies before dependents
pub fn dependency_order(root: &TaskRef) -> Result<Vec<TaskRef>, GraphError> {
    debug!(root = %root.name(), "dependency_order: called");
    let mut walk = Walk::default();
    walk.visit(root)?;
    debug!(count = walk.order.len(), "dependency_order: complete");
    Ok(walk.order)
}

#[derive(Default)]
struct Walk {
    seen: HashMap<String, TaskRef>,
    visited: HashSet<String>,
    path: Vec<String>,
    order: Vec<TaskRef>,
}

impl Walk {
    fn visit(&mut self, task: &TaskRef) -> Result<(), GraphError> {
        let name = task.name();

        if self.path.iter().any(|n| n == name) {
            let start = self.path.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle = self.path[start..].to_vec();
            cycle.push(name.to_string());
            debug!(?cycle, "Walk::visit: back edge found - cycle detected");
            return Err(GraphError::Cycle(cycle));
        }
        if let Some(existing) = self.seen.get(name) {
            if !Arc::ptr_eq(existing, task) {
                debug!(%name, "Walk::visit: name reused by a different task");
                return Err(GraphError::DuplicateName(name.to_string()));
            }
            if self.visited.contains(name) {
                return Ok(());
            }
        }
        self.seen.insert(name.to_string(), task.clone());

        self.path.push(name.to_string());
        for dependency in task.dependencies() {
            self.visit(dependency)?;
        }
        self.path.pop();

        self.visited.insert(name.to_string());
        self.order.push(task.clone());
        Ok(())
    }
}

/// Describe a task for listings
pub fn describe(task: &Task) -> String {
    let deps: Vec<&str> = task.dependencies().iter().map(|d| d.name()).collect();
    match task {
        Task::Leaf(_) => format!("{} (leaf)", task.name()),
        Task::Composite(c) => format!(
            "{} (composite, critic: {}) <- [{}]",
            task.name(),
            c.critic.name,
            deps.join(", ")
        ),
    }
}
