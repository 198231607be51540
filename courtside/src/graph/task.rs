//! Task graph types

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::events::EventEmitter;
use crate::refine::{Critic, RefinementError};

/// Shared handle to a task node
pub type TaskRef = Arc<Task>;

/// A node of the task graph
#[derive(Debug)]
pub enum Task {
    Leaf(LeafTask),
    Composite(CompositeTask),
}

impl Task {
    /// Build a leaf from an async closure over the run parameters
    pub fn leaf<F, Fut>(name: impl Into<String>, f: F) -> TaskRef
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, LeafError>> + Send + 'static,
    {
        Arc::new(Task::Leaf(LeafTask::from_fn(name, f)))
    }

    pub fn composite(task: CompositeTask) -> TaskRef {
        Arc::new(Task::Composite(task))
    }

    /// Unique within a run; the cache and dedup key
    pub fn name(&self) -> &str {
        match self {
            Task::Leaf(leaf) => &leaf.name,
            Task::Composite(composite) => &composite.name,
        }
    }

    pub fn dependencies(&self) -> &[TaskRef] {
        match self {
            Task::Leaf(_) => &[],
            Task::Composite(composite) => &composite.dependencies,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::Leaf(_) => "leaf",
            Task::Composite(_) => "composite",
        }
    }
}

/// A zero-dependency unit of work over the run parameters
#[async_trait]
pub trait LeafFn: Send + Sync {
    async fn run(&self, run: &RunContext) -> Result<TaskOutput, LeafError>;
}

struct FnLeaf<F>(F);

#[async_trait]
impl<F, Fut> LeafFn for FnLeaf<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutput, LeafError>> + Send,
{
    async fn run(&self, run: &RunContext) -> Result<TaskOutput, LeafError> {
        (self.0)(run.clone()).await
    }
}

pub struct LeafTask {
    pub name: String,
    pub func: Arc<dyn LeafFn>,
}

impl LeafTask {
    pub fn new(name: impl Into<String>, func: Arc<dyn LeafFn>) -> Self {
        Self { name: name.into(), func }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, LeafError>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnLeaf(f)))
    }
}

impl fmt::Debug for LeafTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafTask").field("name", &self.name).finish()
    }
}

/// A task executed through a refinement loop
#[derive(Debug, Clone)]
pub struct CompositeTask {
    pub name: String,
    /// Worker instructions for the first iteration
    pub instructions: String,
    /// Names of the tool backends the worker may use
    pub tool_backends: Vec<String>,
    pub critic: Arc<Critic>,
    pub dependencies: Vec<TaskRef>,
    /// Model override for worker (and critic, unless it has its own)
    pub model: Option<String>,
}

impl CompositeTask {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, critic: Arc<Critic>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tool_backends: Vec::new(),
            critic,
            dependencies: Vec::new(),
            model: None,
        }
    }

    pub fn with_tools<S: Into<String>>(mut self, backends: impl IntoIterator<Item = S>) -> Self {
        self.tool_backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = TaskRef>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Result of a resolved task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Text(String),
    Structured(Value),
}

impl TaskOutput {
    pub fn text(text: impl Into<String>) -> Self {
        TaskOutput::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TaskOutput::Text(text) => Some(text),
            TaskOutput::Structured(_) => None,
        }
    }
}

impl fmt::Display for TaskOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutput::Text(text) => f.write_str(text),
            TaskOutput::Structured(value) => match serde_json::to_string_pretty(value) {
                Ok(pretty) => f.write_str(&pretty),
                Err(_) => write!(f, "{}", value),
            },
        }
    }
}

/// Immutable global parameters of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub entity_a: String,
    pub entity_b: String,
    pub game_date: NaiveDate,
    /// Wall-clock date the run started
    pub today: NaiveDate,
}

impl RunContext {
    pub fn new(entity_a: impl Into<String>, entity_b: impl Into<String>, game_date: NaiveDate) -> Self {
        Self {
            entity_a: entity_a.into(),
            entity_b: entity_b.into(),
            game_date,
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

/// Resolved dependency outputs, in declaration order
#[derive(Debug, Clone, Default)]
pub struct DependencyOutputs {
    entries: Vec<(String, Arc<TaskOutput>)>,
}

impl DependencyOutputs {
    pub fn new(entries: Vec<(String, Arc<TaskOutput>)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskOutput>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<TaskOutput>)> {
        self.entries.iter().map(|(n, o)| (n.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `--- Input from NAME ---` sections for the worker's user turn
    pub fn render_context(&self) -> String {
        self.entries
            .iter()
            .map(|(name, output)| format!("--- Input from {} ---\n{}", name, output))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A leaf function failed
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LeafError {
    pub message: String,
}

impl LeafError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<crate::tools::ToolError> for LeafError {
    fn from(e: crate::tools::ToolError) -> Self {
        Self::new(e.to_string())
    }
}

/// Executes a composite task's own logic once its dependencies resolved
#[async_trait]
pub trait CompositeRunner: Send + Sync {
    async fn run(
        &self,
        task: &CompositeTask,
        inputs: &DependencyOutputs,
        run: &RunContext,
        emitter: &EventEmitter,
    ) -> Result<TaskOutput, RefinementError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critic() -> Arc<Critic> {
        Arc::new(Critic::new("critic", "{{output}}"))
    }

    #[tokio::test]
    async fn test_leaf_from_closure() {
        let task = Task::leaf("fetch", |run: RunContext| async move {
            Ok(TaskOutput::text(format!("{} data", run.entity_a)))
        });
        let run = RunContext::new("BOS", "NYK", NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        match task.as_ref() {
            Task::Leaf(leaf) => {
                assert_eq!(leaf.func.run(&run).await.unwrap(), TaskOutput::text("BOS data"));
            }
            Task::Composite(_) => panic!("expected leaf"),
        }
        assert_eq!(task.name(), "fetch");
        assert!(task.dependencies().is_empty());
        assert_eq!(task.kind(), "leaf");
    }

    #[test]
    fn test_composite_builder() {
        let dep = Task::leaf("a", |_| async { Ok(TaskOutput::text("A")) });
        let task = Task::composite(
            CompositeTask::new("root", "Combine.", critic())
                .with_tools(["nba"])
                .depends_on([dep.clone()])
                .with_model(Some("pro".into())),
        );
        assert_eq!(task.dependencies().len(), 1);
        assert!(Arc::ptr_eq(&task.dependencies()[0], &dep));
        assert_eq!(task.kind(), "composite");
    }

    #[test]
    fn test_render_context_sections() {
        let outputs = DependencyOutputs::new(vec![
            ("fetch_a".to_string(), Arc::new(TaskOutput::text("A-DATA"))),
            ("fetch_b".to_string(), Arc::new(TaskOutput::Structured(serde_json::json!({"b": 1})))),
        ]);
        let context = outputs.render_context();
        assert!(context.starts_with("--- Input from fetch_a ---\nA-DATA\n\n--- Input from fetch_b ---\n{"));
        assert_eq!(outputs.get("fetch_a").unwrap().as_text(), Some("A-DATA"));
        assert!(outputs.get("missing").is_none());
    }
}
