//! The editorial task graph
//!
//! ```text
//! writer            <- match_prediction, fan_narrative, rivalry
//! match_prediction  <- team_performance, player_performance, inactive_players, odds, schedule
//! fan_narrative     <- team_performance, player_performance, inactive_players, schedule
//! rivalry           <- matchup_history
//! schedule          <- team_schedule
//! ```

use std::sync::Arc;

use tracing::debug;

use super::PipelineError;
use super::leaves::BackendToolLeaf;
use crate::config::Config;
use crate::graph::{CompositeTask, LeafTask, Task, TaskRef};
use crate::prompts::PromptLoader;
use crate::refine::Critic;
use crate::tools::{BackendRegistry, RetryPolicy};

/// Name of the root task
pub const ROOT_TASK: &str = "writer";

/// Builds the editorial graph from configuration and prompt templates
pub struct EditorialGraph<'a> {
    config: &'a Config,
    prompts: &'a PromptLoader,
    registry: BackendRegistry,
}

impl<'a> EditorialGraph<'a> {
    pub fn new(config: &'a Config, prompts: &'a PromptLoader, registry: BackendRegistry) -> Self {
        Self {
            config,
            prompts,
            registry,
        }
    }

    /// Build every task and return the root
    pub fn build(&self) -> Result<TaskRef, PipelineError> {
        debug!("EditorialGraph::build: called");
        let stats = self.config.pipeline.stats_backend.as_str();
        let search = self.config.pipeline.search_backend.as_str();
        let pro = Some(self.config.llm.pro_model.clone());

        let research_critic = Arc::new(Critic::new("research_critic", self.template("research-critic")?));
        let writer_critic =
            Arc::new(Critic::new("writer_critic", self.template("writer-critic")?).with_model(self.config.llm.pro_model.clone()));

        let team_performance = self.leaf("team_performance");
        let player_performance = self.leaf("player_performance");
        let matchup_history = self.leaf("matchup_history");
        let team_schedule = self.leaf("team_schedule");

        let inactive_players = self.composite("inactive_players", "inactive-players", &research_critic, |t| {
            t.with_tools([search])
        })?;
        let odds = self.composite("odds", "odds", &research_critic, |t| t.with_tools([search]))?;
        let rivalry = self.composite("rivalry", "rivalry", &research_critic, |t| {
            t.with_tools([search]).depends_on([matchup_history])
        })?;
        let schedule = self.composite("schedule", "schedule", &research_critic, |t| {
            t.depends_on([team_schedule])
        })?;

        let match_prediction = self.composite("match_prediction", "match-prediction", &research_critic, |t| {
            t.with_tools([stats])
                .with_model(pro.clone())
                .depends_on([
                    team_performance.clone(),
                    player_performance.clone(),
                    inactive_players.clone(),
                    odds,
                    schedule.clone(),
                ])
        })?;
        let fan_narrative = self.composite("fan_narrative", "fan-narrative", &research_critic, |t| {
            t.with_model(pro.clone())
                .depends_on([team_performance, player_performance, inactive_players, schedule])
        })?;

        self.composite(ROOT_TASK, "writer", &writer_critic, |t| {
            t.with_model(pro.clone())
                .depends_on([match_prediction, fan_narrative, rivalry])
        })
    }

    fn template(&self, name: &str) -> Result<String, PipelineError> {
        self.prompts
            .load_template(name)
            .map_err(|e| PipelineError::Configuration(format!("{}: {}", name, e)))
    }

    fn leaf(&self, name: &str) -> TaskRef {
        let tool = self.config.pipeline.leaf_tool(name);
        let leaf = BackendToolLeaf::new(
            self.registry.clone(),
            &self.config.pipeline.stats_backend,
            tool,
            RetryPolicy::from_config(&self.config.retry),
        );
        Arc::new(Task::Leaf(LeafTask::new(name, Arc::new(leaf))))
    }

    fn composite(
        &self,
        name: &str,
        template: &str,
        critic: &Arc<Critic>,
        configure: impl FnOnce(CompositeTask) -> CompositeTask,
    ) -> Result<TaskRef, PipelineError> {
        let task = CompositeTask::new(name, self.template(template)?, critic.clone());
        Ok(Task::composite(configure(task)))
    }
}
