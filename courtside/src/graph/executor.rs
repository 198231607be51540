//! GraphExecutor - resolves tasks with caching, inflight dedup and fan-out
//!
//! Every resolution of a task name goes through one critical section that
//! checks the cache, then the inflight table, then starts the work. The
//! started work is a spawned tokio task wrapped in a `Shared` future so any
//! number of concurrent requesters await the same result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::validate::{GraphError, validate_graph};
use super::{CompositeRunner, DependencyOutputs, RunContext, Task, TaskOutput, TaskRef};
use crate::events::EventEmitter;
use crate::refine::RefinementError;

/// Errors from resolving a task
///
/// Cloneable so one failure can be handed to every requester of the task.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("Task {task} not run: dependency {dependency} failed")]
    DependencyFailure {
        task: String,
        dependency: String,
        #[source]
        cause: Arc<ExecutionError>,
    },

    #[error("Leaf task {task} failed: {message}")]
    Leaf { task: String, message: String },

    #[error("Task {task} failed: {source}")]
    Refinement {
        task: String,
        #[source]
        source: Arc<RefinementError>,
    },

    #[error("Invalid task graph: {0}")]
    Configuration(#[from] GraphError),

    #[error("Task {task} aborted: {reason}")]
    Aborted { task: String, reason: String },
}

impl ExecutionError {
    /// Name of the task this error is about
    pub fn task(&self) -> Option<&str> {
        match self {
            ExecutionError::DependencyFailure { task, .. }
            | ExecutionError::Leaf { task, .. }
            | ExecutionError::Refinement { task, .. }
            | ExecutionError::Aborted { task, .. } => Some(task),
            ExecutionError::Configuration(_) => None,
        }
    }

    /// Follow dependency failures down to the task that actually failed
    pub fn root_cause(&self) -> &ExecutionError {
        let mut current = self;
        while let ExecutionError::DependencyFailure { cause, .. } = current {
            current = cause.as_ref();
        }
        current
    }
}

type Resolution = Result<Arc<TaskOutput>, ExecutionError>;
type SharedResolution = Shared<BoxFuture<'static, Resolution>>;

#[derive(Default)]
struct ExecutionState {
    cache: HashMap<String, Arc<TaskOutput>>,
    inflight: HashMap<String, SharedResolution>,
}

struct Inner {
    state: Mutex<ExecutionState>,
    run: RunContext,
    runner: Arc<dyn CompositeRunner>,
    emitter: EventEmitter,
}

/// Resolves a task graph for one run
///
/// Cheap to clone; clones share the cache and inflight table.
#[derive(Clone)]
pub struct GraphExecutor {
    inner: Arc<Inner>,
}

impl GraphExecutor {
    pub fn new(run: RunContext, runner: Arc<dyn CompositeRunner>, emitter: EventEmitter) -> Self {
        debug!(run_id = %emitter.run_id(), "GraphExecutor::new: called");
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ExecutionState::default()),
                run,
                runner,
                emitter,
            }),
        }
    }

    pub fn run_context(&self) -> &RunContext {
        &self.inner.run
    }

    /// Validate the graph under `root`, then resolve it
    pub async fn resolve_root(&self, root: &TaskRef) -> Resolution {
        debug!(root = %root.name(), "GraphExecutor::resolve_root: called");
        validate_graph(root)?;
        self.resolve(root.clone()).await
    }

    /// Resolve one task, reusing a cached or inflight result when present
    pub async fn resolve(&self, task: TaskRef) -> Resolution {
        let name = task.name().to_string();
        let pending = {
            let mut state = self.state();
            if let Some(output) = state.cache.get(&name) {
                debug!(%name, "GraphExecutor::resolve: cache hit");
                self.inner.emitter.for_task(&name).cache_hit();
                return Ok(output.clone());
            }
            match state.inflight.get(&name) {
                Some(pending) => {
                    debug!(%name, "GraphExecutor::resolve: joining inflight execution");
                    pending.clone()
                }
                None => {
                    debug!(%name, "GraphExecutor::resolve: starting execution");
                    let pending = self.start(task);
                    state.inflight.insert(name.clone(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Output of a task that already succeeded in this run
    pub fn cached(&self, name: &str) -> Option<Arc<TaskOutput>> {
        self.state().cache.get(name).cloned()
    }

    pub fn is_inflight(&self, name: &str) -> bool {
        self.state().inflight.contains_key(name)
    }

    fn state(&self) -> MutexGuard<'_, ExecutionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, task: TaskRef) -> SharedResolution {
        let name = task.name().to_string();
        let executor = self.clone();
        let handle = tokio::spawn(executor.execute(task));
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%name, error = %e, "GraphExecutor::start: task panicked or was cancelled");
                    Err(ExecutionError::Aborted {
                        task: name,
                        reason: e.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    fn execute(self, task: TaskRef) -> BoxFuture<'static, Resolution> {
        async move {
            let name = task.name().to_string();
            let emitter = self.inner.emitter.for_task(&name);
            emitter.task_started(task.kind());
            let started = Instant::now();

            let result = self.run_task(&task, &emitter).await;

            {
                let mut state = self.state();
                state.inflight.remove(&name);
                if let Ok(output) = &result {
                    state.cache.insert(name.clone(), output.clone());
                }
            }

            let elapsed = started.elapsed().as_millis() as u64;
            match &result {
                Ok(output) => {
                    info!(%name, elapsed_ms = elapsed, "Task completed");
                    emitter.task_completed(&output.to_string(), elapsed);
                }
                Err(e) => {
                    warn!(%name, error = %e, "Task failed");
                    emitter.task_failed(&e.to_string());
                }
            }
            result
        }
        .boxed()
    }

    async fn run_task(&self, task: &TaskRef, emitter: &EventEmitter) -> Resolution {
        let name = task.name().to_string();
        match task.as_ref() {
            Task::Leaf(leaf) => {
                debug!(%name, "GraphExecutor::run_task: running leaf");
                leaf.func
                    .run(&self.inner.run)
                    .await
                    .map(Arc::new)
                    .map_err(|e| ExecutionError::Leaf {
                        task: name,
                        message: e.message,
                    })
            }
            Task::Composite(composite) => {
                debug!(%name, deps = composite.dependencies.len(), "GraphExecutor::run_task: resolving dependencies");
                let results = join_all(composite.dependencies.iter().map(|d| self.resolve(d.clone()))).await;

                let mut entries = Vec::with_capacity(results.len());
                for (dependency, result) in composite.dependencies.iter().zip(results) {
                    match result {
                        Ok(output) => entries.push((dependency.name().to_string(), output)),
                        Err(cause) => {
                            debug!(%name, dependency = %dependency.name(), "GraphExecutor::run_task: dependency failed");
                            return Err(ExecutionError::DependencyFailure {
                                task: name,
                                dependency: dependency.name().to_string(),
                                cause: Arc::new(cause),
                            });
                        }
                    }
                }

                let inputs = DependencyOutputs::new(entries);
                self.inner
                    .runner
                    .run(composite, &inputs, &self.inner.run, emitter)
                    .await
                    .map(Arc::new)
                    .map_err(|e| ExecutionError::Refinement {
                        task: name,
                        source: Arc::new(e),
                    })
            }
        }
    }
}
