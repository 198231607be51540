//! Statistics leaves - one backend tool call per leaf

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::graph::{LeafError, LeafFn, RunContext, TaskOutput};
use crate::tools::{BackendRegistry, RetryPolicy, ToolError, ToolOutput};

/// Leaf names of the editorial graph, in declaration order
pub const LEAF_NAMES: [&str; 4] = ["team_performance", "player_performance", "matchup_history", "team_schedule"];

/// Calls `tool` on `backend` with the run's teams and date
///
/// The backend is looked up when the leaf runs, so a graph can be built
/// (and listed) before any backend is connected.
pub struct BackendToolLeaf {
    registry: BackendRegistry,
    backend: String,
    tool: String,
    retry: RetryPolicy,
}

impl BackendToolLeaf {
    pub fn new(registry: BackendRegistry, backend: impl Into<String>, tool: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            backend: backend.into(),
            tool: tool.into(),
            retry,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }
}

/// Arguments every statistics leaf receives
pub fn leaf_arguments(run: &RunContext) -> Value {
    json!({
        "team1": run.entity_a,
        "team2": run.entity_b,
        "game_date": run.game_date.format("%Y-%m-%d").to_string(),
    })
}

fn leaf_output(output: ToolOutput) -> TaskOutput {
    match output.structured {
        Some(Value::String(text)) => TaskOutput::Text(text),
        Some(value) => TaskOutput::Structured(value),
        None => TaskOutput::Text(output.texts.join("\n")),
    }
}

#[async_trait]
impl LeafFn for BackendToolLeaf {
    async fn run(&self, run: &RunContext) -> Result<TaskOutput, LeafError> {
        debug!(backend = %self.backend, tool = %self.tool, "BackendToolLeaf::run: called");
        let backend = self
            .registry
            .get(&self.backend)
            .ok_or_else(|| ToolError::UnknownBackend(self.backend.clone()))?;
        let arguments = leaf_arguments(run);

        let output = self
            .retry
            .run(&self.tool, || backend.call(&self.tool, arguments.clone()))
            .await?;
        Ok(leaf_output(output))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::tools::mock::MockBackend;

    fn run_context() -> RunContext {
        RunContext::new("Celtics", "Knicks", NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            multiplier: 2,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn registry_with(backend: MockBackend) -> (BackendRegistry, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let mut registry = BackendRegistry::new();
        registry.register(backend.clone());
        (registry, backend)
    }

    #[test]
    fn test_leaf_arguments() {
        assert_eq!(
            leaf_arguments(&run_context()),
            json!({"team1": "Celtics", "team2": "Knicks", "game_date": "2025-01-15"})
        );
    }

    #[tokio::test]
    async fn test_structured_result_kept() {
        let backend = MockBackend::new("nba").tool_with("get_team_performance", &["team"], |args| {
            Ok(ToolOutput::structured(json!({"team": args["team1"], "ppg": 117.3})))
        });
        let (registry, backend) = registry_with(backend);

        let leaf = BackendToolLeaf::new(registry, "nba", "get_team_performance", fast_retry());
        let output = leaf.run(&run_context()).await.unwrap();
        assert_eq!(output, TaskOutput::Structured(json!({"team": "Celtics", "ppg": 117.3})));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let backend = MockBackend::new("nba").tool_with("get_team_schedule", &["team"], move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ToolError::Transport("connection reset".into()))
            } else {
                Ok(ToolOutput::text("rested two days"))
            }
        });
        let (registry, _backend) = registry_with(backend);

        let leaf = BackendToolLeaf::new(registry, "nba", "get_team_schedule", fast_retry());
        let output = leaf.run(&run_context()).await.unwrap();
        assert_eq!(output.as_text(), Some("rested two days"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let backend = MockBackend::new("nba").tool_with("get_matchup_history", &["game"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend {
                tool: "get_matchup_history".into(),
                message: "unknown team".into(),
            })
        });
        let (registry, _backend) = registry_with(backend);

        let leaf = BackendToolLeaf::new(registry, "nba", "get_matchup_history", fast_retry());
        let err = leaf.run(&run_context()).await.unwrap_err();
        assert!(err.message.contains("unknown team"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_backend_fails_at_run() {
        let leaf = BackendToolLeaf::new(BackendRegistry::new(), "nba", "get_team_performance", RetryPolicy::none());
        let err = leaf.run(&run_context()).await.unwrap_err();
        assert!(err.message.contains("nba"));
    }
}
