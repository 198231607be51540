//! Run telemetry
//!
//! Every significant action in a pipeline run emits a [`PipelineEvent`] on the
//! bus. Consumers (the JSONL trace logger, tests) subscribe to it.
//!
//! ```text
//!  Graph Executor     Refinement Loop     Conversation Loop
//!  - TaskStarted      - IterationStarted  - PromptSent
//!  - CacheHit         - CritiqueReceived  - ToolCallStarted
//!  - TaskCompleted    - Accepted          - ToolSetChanged
//!         │                  │                   │
//!         └──────────► EVENT BUS ◄───────────────┘
//!                          │
//!                  trace_{run_id}.jsonl
//! ```
//!
//! Emitters are passed explicitly: the executor scopes one per task with
//! [`EventEmitter::for_task`] and hands it to whatever runs that task.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{TraceLogger, read_trace, spawn_trace_logger, trace_path};
pub use types::{PipelineEvent, TraceEntry, summarize};
