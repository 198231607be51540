//! Editorial pipeline - run one graph for (entity_a, entity_b, date)
//!
//! Builds the editorial graph, resolves it through a [`GraphExecutor`] and
//! folds any execution failure into a single [`PipelineError`].

mod editorial;
mod leaves;

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::events::EventBus;
use crate::graph::{CompositeRunner, ExecutionError, GraphExecutor, RunContext, TaskOutput, TaskRef, validate_graph};
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::refine::{RefinementError, RefinementLoop};
use crate::tools::BackendRegistry;

pub use editorial::{EditorialGraph, ROOT_TASK};
pub use leaves::{BackendToolLeaf, LEAF_NAMES, leaf_arguments};

/// Terminal error of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A task never ran because something it needs failed
    #[error("Task {task} could not run: dependency {dependency} failed ({failed}: {cause})")]
    DependencyFailure {
        task: String,
        dependency: String,
        /// The task where the failure originated
        failed: String,
        cause: String,
    },

    /// The model exchange itself failed, possibly below the root
    #[error("Model exchange failed in task {task}{}: {source}", via_suffix(.via))]
    Channel {
        task: String,
        /// The dependent whose resolution hit the failure, when not `task` itself
        via: Option<String>,
        #[source]
        source: Arc<RefinementError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },
}

fn via_suffix(via: &Option<String>) -> String {
    via.as_ref().map(|v| format!(" (while resolving {})", v)).unwrap_or_default()
}

impl From<ExecutionError> for PipelineError {
    fn from(err: ExecutionError) -> Self {
        let via = match &err {
            ExecutionError::DependencyFailure { task, .. } => Some(task.clone()),
            _ => None,
        };

        // Channel and configuration failures keep their class however deep they start
        if let ExecutionError::Refinement { task, source } = err.root_cause() {
            if let RefinementError::Configuration(message) = source.as_ref() {
                return PipelineError::Configuration(message.clone());
            }
            if source.is_channel_failure() {
                return PipelineError::Channel {
                    task: task.clone(),
                    via,
                    source: source.clone(),
                };
            }
        }

        match err {
            ExecutionError::DependencyFailure {
                ref task,
                ref dependency,
                ..
            } => {
                let root = err.root_cause();
                PipelineError::DependencyFailure {
                    task: task.clone(),
                    dependency: dependency.clone(),
                    failed: root.task().unwrap_or(dependency.as_str()).to_string(),
                    cause: root.to_string(),
                }
            }
            ExecutionError::Refinement { task, source } => PipelineError::Task {
                task,
                message: source.to_string(),
            },
            ExecutionError::Leaf { task, message } => PipelineError::Task { task, message },
            ExecutionError::Aborted { task, reason } => PipelineError::Task { task, message: reason },
            ExecutionError::Configuration(e) => PipelineError::Configuration(e.to_string()),
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: String,
    pub output: Arc<TaskOutput>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn text(&self) -> String {
        self.output.to_string()
    }
}

/// A validated graph plus what it needs to run
pub struct Pipeline {
    root: TaskRef,
    runner: Arc<dyn CompositeRunner>,
    bus: Arc<EventBus>,
}

impl Pipeline {
    /// Validate `root` and wrap it for running
    pub fn new(root: TaskRef, runner: Arc<dyn CompositeRunner>, bus: Arc<EventBus>) -> Result<Self, PipelineError> {
        debug!(root = %root.name(), "Pipeline::new: called");
        validate_graph(&root).map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Ok(Self { root, runner, bus })
    }

    /// The editorial graph, refined through `llm` with tools from `registry`
    pub fn editorial(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        registry: BackendRegistry,
        prompts: Arc<PromptLoader>,
        bus: Arc<EventBus>,
    ) -> Result<Self, PipelineError> {
        debug!("Pipeline::editorial: called");
        let root = EditorialGraph::new(config, &prompts, registry.clone()).build()?;
        let runner = RefinementLoop::new(llm, registry, prompts).with_config(&config.refinement);
        Self::new(root, Arc::new(runner), bus)
    }

    pub fn root(&self) -> &TaskRef {
        &self.root
    }

    /// Run the pipeline for one matchup, returning the root's output
    pub async fn run(
        &self,
        entity_a: &str,
        entity_b: &str,
        game_date: NaiveDate,
    ) -> Result<PipelineReport, PipelineError> {
        let run = RunContext::new(entity_a, entity_b, game_date);
        self.run_with(run, Uuid::now_v7().to_string()).await
    }

    /// Run with an explicit context and run id
    pub async fn run_with(&self, run: RunContext, run_id: String) -> Result<PipelineReport, PipelineError> {
        info!(%run_id, entity_a = %run.entity_a, entity_b = %run.entity_b, game_date = %run.game_date, "Pipeline run starting");
        let emitter = self.bus.emitter_for(&run_id);
        emitter.run_started(
            self.root.name(),
            &run.entity_a,
            &run.entity_b,
            &run.game_date.format("%Y-%m-%d").to_string(),
        );

        let started = Instant::now();
        let executor = GraphExecutor::new(run, self.runner.clone(), emitter.clone());
        let result = executor.resolve_root(&self.root).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        emitter.run_completed(result.is_ok(), duration_ms);
        match result {
            Ok(output) => {
                info!(%run_id, duration_ms, "Pipeline run complete");
                Ok(PipelineReport {
                    run_id,
                    output,
                    duration_ms,
                })
            }
            Err(e) => {
                let err = PipelineError::from(e);
                error!(%run_id, error = %err, "Pipeline run failed");
                emitter.error("pipeline", &err.to_string());
                Err(err)
            }
        }
    }
}
