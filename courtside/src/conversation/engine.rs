//! ConversationLoop - multi-turn model exchange with tool routing

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{ConversationError, ConversationState};
use crate::events::EventEmitter;
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, StopReason, ToolCall};
use crate::tools::category::{acknowledgement, parse_selection};
use crate::tools::{CategoryError, ToolCategory, ToolRouter, error_payload};

/// Sent once the turn cap is reached, with tools withdrawn
const WRAP_UP_PROMPT: &str =
    "Tool budget exhausted. Answer now using only the information already gathered.";

/// Sent after a response was cut off by the token limit
const CONTINUE_PROMPT: &str = "Continue from where you left off. Your previous response was truncated.";

/// Outcome of one requested tool invocation, before it is appended
enum CallOutcome {
    Selection(Result<Vec<ToolCategory>, CategoryError>),
    Routed { content: String, is_error: bool },
}

/// Drives one tool-calling conversation to a final text
pub struct ConversationLoop {
    llm: Arc<dyn LlmClient>,
    router: Arc<ToolRouter>,
    max_turns: u32,
    max_tokens: u32,
    model: Option<String>,
}

impl ConversationLoop {
    pub fn new(llm: Arc<dyn LlmClient>, router: Arc<ToolRouter>) -> Self {
        Self {
            llm,
            router,
            max_turns: 50,
            max_tokens: 8192,
            model: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Seed a fresh state: system, user turn and the base tool set
    pub fn start(&self, system: &str, user: &str) -> ConversationState {
        ConversationState::new(system, user, self.router.base_tools())
    }

    /// Run a conversation to completion and return the final text
    pub async fn converse(&self, system: &str, user: &str, emitter: &EventEmitter) -> Result<String, ConversationError> {
        let mut state = self.start(system, user);
        self.drive(&mut state, emitter).await
    }

    /// Loop until the model answers without requesting tools
    ///
    /// Only a failed model exchange ends the loop with an error; tool failures
    /// are handed back to the model as error payloads.
    pub async fn drive(&self, state: &mut ConversationState, emitter: &EventEmitter) -> Result<String, ConversationError> {
        debug!(max_turns = self.max_turns, tools = state.visible_tools.len(), "ConversationLoop::drive: called");
        let mut truncated = String::new();

        loop {
            state.turns += 1;
            let turn = state.turns;
            let wrap_up = turn > self.max_turns;
            if wrap_up {
                warn!(turn, max_turns = self.max_turns, "ConversationLoop::drive: turn cap reached, forcing final answer");
                state.push(Message::user(WRAP_UP_PROMPT));
            }

            let tools = if wrap_up { Vec::new() } else { state.visible_tools.clone() };
            emitter.prompt_sent(turn, &state.last_turn_text(), tools.len());

            let request = CompletionRequest {
                system_prompt: state.system.clone(),
                messages: state.transcript.clone(),
                tools,
                max_tokens: self.max_tokens,
                model: self.model.clone(),
            };
            let response = self.llm.complete(request).await.map_err(|e| {
                emitter.error("conversation", &e.to_string());
                ConversationError::Channel(e)
            })?;

            let text = response.content.clone().unwrap_or_default();
            emitter.response_completed(
                turn,
                &text,
                response.usage.input_tokens,
                response.usage.output_tokens,
                response.has_tool_calls(),
            );
            state.push(assistant_message(&response));

            if !response.has_tool_calls() || wrap_up {
                if response.stop_reason == StopReason::MaxTokens && !wrap_up {
                    debug!(turn, "ConversationLoop::drive: response truncated, asking to continue");
                    truncated.push_str(&text);
                    state.push(Message::user(CONTINUE_PROMPT));
                    continue;
                }
                info!(turns = turn, "ConversationLoop::drive: conversation complete");
                truncated.push_str(&text);
                return Ok(truncated);
            }
            truncated.clear();

            debug!(turn, count = response.tool_calls.len(), "ConversationLoop::drive: executing tool calls");
            let results = self.execute_calls(state, &response.tool_calls, emitter).await;
            state.push(Message::user_blocks(results));
        }
    }

    /// Run every call of one turn concurrently; results keep request order
    ///
    /// Category selections are applied after all calls finish. The last
    /// valid selection of the turn wins; an invalid one leaves the visible
    /// tools untouched.
    async fn execute_calls(
        &self,
        state: &mut ConversationState,
        calls: &[ToolCall],
        emitter: &EventEmitter,
    ) -> Vec<ContentBlock> {
        let outcomes = join_all(calls.iter().map(|call| self.execute_call(call, emitter))).await;

        let mut selection = None;
        let mut blocks = Vec::with_capacity(calls.len());
        for (call, outcome) in calls.iter().zip(outcomes) {
            match outcome {
                CallOutcome::Selection(Ok(categories)) => {
                    blocks.push(ContentBlock::tool_result(&call.id, acknowledgement(&categories), false));
                    selection = Some(categories);
                }
                CallOutcome::Selection(Err(e)) => {
                    warn!(error = %e, "ConversationLoop::execute_calls: rejected category selection");
                    emitter.warning("category-selection", &e.to_string());
                    blocks.push(ContentBlock::tool_result(&call.id, error_payload(&e.to_string()), true));
                }
                CallOutcome::Routed { content, is_error } => {
                    blocks.push(ContentBlock::tool_result(&call.id, content, is_error));
                }
            }
        }

        if let Some(categories) = selection {
            state.visible_tools = self.router.tools_for(&categories);
            debug!(?categories, tools = state.visible_tools.len(), "ConversationLoop::execute_calls: visible tools replaced");
            emitter.tool_set_changed(
                categories.iter().map(|c| c.to_string()).collect(),
                state.visible_tools.len(),
            );
        }
        blocks
    }

    async fn execute_call(&self, call: &ToolCall, emitter: &EventEmitter) -> CallOutcome {
        if self.router.is_category_tool(&call.name) {
            debug!(args = %call.input, "ConversationLoop::execute_call: category selection");
            return CallOutcome::Selection(parse_selection(&call.input));
        }

        emitter.tool_call_started(&call.name, &call.input.to_string());
        let started = Instant::now();
        let (content, is_error) = match self.router.call(&call.name, call.input.clone()).await {
            Ok(output) => (output.to_content(), false),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "ConversationLoop::execute_call: tool failed");
                (error_payload(&e.to_string()), true)
            }
        };
        emitter.tool_call_completed(&call.name, !is_error, &content, started.elapsed().as_millis() as u64);
        CallOutcome::Routed { content, is_error }
    }
}

fn assistant_message(response: &CompletionResponse) -> Message {
    let mut blocks = Vec::new();
    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }
    for call in &response.tool_calls {
        blocks.push(ContentBlock::tool_use(call));
    }
    Message::assistant_blocks(blocks)
}
