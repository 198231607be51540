//! Courtside - critic-refined pre-game editorials
//!
//! Courtside resolves a graph of research and synthesis tasks for one game.
//! Leaves fetch statistics; composites are written by a model worker and
//! judged by a model critic until accepted or out of iterations.
//!
//! # Core Concepts
//!
//! - **Once per run**: a task name executes at most once, however many
//!   dependents request it concurrently
//! - **Fan-out first**: every dependency is started before any is awaited
//! - **Explicit acceptance**: a critic accepts only by calling `exit_loop`
//! - **Narrow tool surface**: the model selects tool categories instead of
//!   seeing the whole catalog
//!
//! # Modules
//!
//! - [`graph`] - Task graph, validation and the executor
//! - [`refine`] - Worker/critic refinement loop
//! - [`conversation`] - Multi-turn tool-calling conversation
//! - [`tools`] - Tool backends, routing and category selection
//! - [`llm`] - Model client trait and OpenAI-compatible implementation
//! - [`pipeline`] - The editorial graph and run surface
//! - [`events`] - Run telemetry and JSONL traces
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod conversation;
pub mod events;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod refine;
pub mod tools;

// Re-export commonly used types
pub use config::{BackendConfig, Config, LlmConfig, PipelineConfig, RefinementConfig};
pub use conversation::{ConversationError, ConversationLoop, ConversationState};
pub use events::{EventBus, EventEmitter, PipelineEvent, create_event_bus, read_trace, spawn_trace_logger};
pub use graph::{
    CompositeRunner, CompositeTask, DependencyOutputs, ExecutionError, GraphExecutor, LeafError, LeafFn, RunContext,
    Task, TaskOutput, TaskRef,
};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use pipeline::{EditorialGraph, Pipeline, PipelineError, PipelineReport};
pub use prompts::PromptLoader;
pub use refine::{Critic, RefinementError, RefinementLoop, Verdict, instructions_for};
pub use tools::{BackendRegistry, ToolBackend, ToolCategory, ToolError, ToolRouter};
