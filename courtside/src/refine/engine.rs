//! RefinementLoop - worker/critic iterations for one composite task

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::critic::exit_tool_definition;
use super::session::{RefinementSession, RefinementState, instructions_for};
use super::{RefinementError, Verdict};
use crate::config::RefinementConfig;
use crate::conversation::ConversationLoop;
use crate::events::EventEmitter;
use crate::graph::{CompositeRunner, CompositeTask, DependencyOutputs, RunContext, TaskOutput};
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{PromptLoader, RunPrompt};
use crate::tools::{BackendRegistry, ToolRouter};

/// How the final candidate came to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The critic called `exit_loop`
    Approved,
    /// The iteration budget ran out
    Exhausted,
}

/// Result of one refinement loop
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    /// The worker's last candidate, never critic text
    pub output: String,
    /// Worker invocations
    pub iterations: u32,
    pub acceptance: Acceptance,
}

/// Runs composite tasks: worker conversation, then critic, bounded
pub struct RefinementLoop {
    llm: Arc<dyn LlmClient>,
    registry: BackendRegistry,
    prompts: Arc<PromptLoader>,
    max_iterations: u32,
    max_turns: u32,
    max_tokens: u32,
}

impl RefinementLoop {
    pub fn new(llm: Arc<dyn LlmClient>, registry: BackendRegistry, prompts: Arc<PromptLoader>) -> Self {
        let defaults = RefinementConfig::default();
        Self {
            llm,
            registry,
            prompts,
            max_iterations: defaults.max_iterations,
            max_turns: defaults.max_turns,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn with_config(mut self, config: &RefinementConfig) -> Self {
        self.max_iterations = config.max_iterations.max(1);
        self.max_turns = config.max_turns.max(1);
        self.max_tokens = config.max_tokens;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Iterate until the critic accepts or the budget is spent
    pub async fn refine(
        &self,
        task: &CompositeTask,
        inputs: &DependencyOutputs,
        run: &RunContext,
        emitter: &EventEmitter,
    ) -> Result<RefinementOutcome, RefinementError> {
        debug!(task = %task.name, max_iterations = self.max_iterations, "RefinementLoop::refine: called");
        let backends = self
            .registry
            .select(&task.tool_backends)
            .map_err(|e| RefinementError::Configuration(format!("{}: {}", task.name, e)))?;
        let conversation = ConversationLoop::new(self.llm.clone(), Arc::new(ToolRouter::new(backends)))
            .with_max_turns(self.max_turns)
            .with_max_tokens(self.max_tokens)
            .with_model(task.model.clone());

        let mut prompt = RunPrompt {
            entity_a: run.entity_a.clone(),
            entity_b: run.entity_b.clone(),
            game_date: run.game_date.format("%Y-%m-%d").to_string(),
            today: run.today.format("%m/%d/%Y").to_string(),
            context: (!inputs.is_empty()).then(|| inputs.render_context()),
            previous: None,
        };
        let task_prompt = self.prompts.run_prompt(&prompt).map_err(prompt_error)?;

        let mut session = RefinementSession::new(self.max_iterations);
        loop {
            let iteration = session.iteration;
            let revising = session.is_revising();
            emitter.iteration_started(iteration, revising);

            let mut system = instructions_for(&session, &task.instructions);
            let user = if revising {
                system.push_str("\n\n");
                system.push_str(&self.prompts.load_template("revision-note").map_err(prompt_error)?);
                self.prompts.run_prompt(&prompt).map_err(prompt_error)?
            } else {
                task_prompt.clone()
            };

            let candidate = conversation
                .converse(&system, &user, emitter)
                .await
                .map_err(|source| RefinementError::Worker { iteration, source })?;
            emitter.candidate_produced(iteration, &candidate);
            session.candidate_ready();

            let verdict = self.critique(task, &task_prompt, &candidate, iteration).await?;
            if let Verdict::Revise(critique) = &verdict {
                emitter.critique_received(iteration, critique);
            }

            match session.record(verdict) {
                RefinementState::Accepted => {
                    info!(task = %task.name, iteration, "RefinementLoop::refine: critic accepted");
                    emitter.accepted(iteration);
                    return Ok(RefinementOutcome {
                        output: candidate,
                        iterations: session.worker_invocations(),
                        acceptance: Acceptance::Approved,
                    });
                }
                RefinementState::Exhausted => {
                    warn!(task = %task.name, iterations = session.worker_invocations(), "RefinementLoop::refine: budget exhausted, forcing acceptance");
                    emitter.refinement_exhausted(session.worker_invocations());
                    return Ok(RefinementOutcome {
                        output: candidate,
                        iterations: session.worker_invocations(),
                        acceptance: Acceptance::Exhausted,
                    });
                }
                RefinementState::Generating | RefinementState::Critiquing => {
                    debug!(task = %task.name, next = session.iteration, "RefinementLoop::refine: revising");
                    prompt.previous = Some(candidate);
                }
            }
        }
    }

    /// One completion offering only `exit_loop`
    async fn critique(
        &self,
        task: &CompositeTask,
        task_prompt: &str,
        candidate: &str,
        iteration: u32,
    ) -> Result<Verdict, RefinementError> {
        debug!(task = %task.name, critic = %task.critic.name, iteration, "RefinementLoop::critique: called");
        let system = self
            .prompts
            .critic_instructions(&task.instructions, &task.critic.instructions, candidate)
            .map_err(prompt_error)?;
        let model = task.critic.model.clone().or_else(|| task.model.clone());
        let request = CompletionRequest::new(system, task_prompt, self.max_tokens)
            .with_tools(vec![exit_tool_definition()])
            .with_model(model);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| RefinementError::Critic { iteration, source })?;
        Ok(Verdict::from_response(&response))
    }
}

fn prompt_error(e: eyre::Report) -> RefinementError {
    RefinementError::Prompt(e.to_string())
}

#[async_trait]
impl CompositeRunner for RefinementLoop {
    async fn run(
        &self,
        task: &CompositeTask,
        inputs: &DependencyOutputs,
        run: &RunContext,
        emitter: &EventEmitter,
    ) -> Result<TaskOutput, RefinementError> {
        let outcome = self.refine(task, inputs, run, emitter).await?;
        Ok(TaskOutput::Text(outcome.output))
    }
}
