//! Task graph and its executor
//!
//! ```text
//!                 writer
//!          ┌────────┼─────────┐
//!   match_prediction  fan_narrative  rivalry
//!          │              │            │
//!     research tasks ─────┘     matchup_history
//!          │
//!     stats leaves
//! ```
//!
//! Leaves call a function over the run parameters. Composites wait for all
//! of their dependencies, then run through a [`CompositeRunner`]. A task
//! name resolves at most once per run, however many dependents share it.

mod executor;
mod task;
mod validate;

pub use executor::{ExecutionError, GraphExecutor};
pub use task::{
    CompositeRunner, CompositeTask, DependencyOutputs, LeafError, LeafFn, LeafTask, RunContext, Task, TaskOutput,
    TaskRef,
};
pub use validate::{GraphError, dependency_order, describe, validate_graph};
