//! Event types for pipeline run telemetry
//!
//! These events represent all observable activity in one pipeline run:
//! - Run and task lifecycle (start, cache hits, completion, failure)
//! - Refinement iterations (candidates, critiques, acceptance, exhaustion)
//! - Model exchanges and tool calls inside a conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core event enum - the vocabulary of pipeline activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    // === Run Lifecycle ===
    RunStarted {
        run_id: String,
        root: String,
        entity_a: String,
        entity_b: String,
        game_date: String,
    },
    RunCompleted {
        run_id: String,
        success: bool,
        duration_ms: u64,
    },

    // === Task Lifecycle ===
    TaskStarted {
        run_id: String,
        task: String,
        kind: String,
    },
    /// A resolve call was answered from the run cache
    CacheHit { run_id: String, task: String },
    TaskCompleted {
        run_id: String,
        task: String,
        output_summary: String,
        duration_ms: u64,
    },
    TaskFailed {
        run_id: String,
        task: String,
        error: String,
    },

    // === Refinement ===
    IterationStarted {
        run_id: String,
        task: String,
        iteration: u32,
        revising: bool,
    },
    CandidateProduced {
        run_id: String,
        task: String,
        iteration: u32,
        summary: String,
    },
    CritiqueReceived {
        run_id: String,
        task: String,
        iteration: u32,
        critique: String,
    },
    Accepted {
        run_id: String,
        task: String,
        iteration: u32,
    },
    /// The iteration budget ran out and the last candidate was force-accepted
    RefinementExhausted {
        run_id: String,
        task: String,
        iterations: u32,
    },

    // === Model Exchange ===
    PromptSent {
        run_id: String,
        task: String,
        turn: u32,
        /// First 200 chars of the latest turn
        prompt_summary: String,
        tool_count: usize,
    },
    ResponseCompleted {
        run_id: String,
        task: String,
        turn: u32,
        response_summary: String,
        input_tokens: u64,
        output_tokens: u64,
        has_tool_calls: bool,
    },

    // === Tool Execution ===
    ToolCallStarted {
        run_id: String,
        task: String,
        tool_name: String,
        tool_args_summary: String,
    },
    ToolCallCompleted {
        run_id: String,
        task: String,
        tool_name: String,
        success: bool,
        result_summary: String,
        duration_ms: u64,
    },
    /// The visible tool set was replaced by a category selection
    ToolSetChanged {
        run_id: String,
        task: String,
        categories: Vec<String>,
        tool_count: usize,
    },

    // === Errors & Warnings ===
    Error {
        run_id: String,
        context: String,
        message: String,
    },
    Warning {
        run_id: String,
        context: String,
        message: String,
    },
}

impl PipelineEvent {
    /// Get the run ID for this event
    pub fn run_id(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::TaskStarted { run_id, .. }
            | PipelineEvent::CacheHit { run_id, .. }
            | PipelineEvent::TaskCompleted { run_id, .. }
            | PipelineEvent::TaskFailed { run_id, .. }
            | PipelineEvent::IterationStarted { run_id, .. }
            | PipelineEvent::CandidateProduced { run_id, .. }
            | PipelineEvent::CritiqueReceived { run_id, .. }
            | PipelineEvent::Accepted { run_id, .. }
            | PipelineEvent::RefinementExhausted { run_id, .. }
            | PipelineEvent::PromptSent { run_id, .. }
            | PipelineEvent::ResponseCompleted { run_id, .. }
            | PipelineEvent::ToolCallStarted { run_id, .. }
            | PipelineEvent::ToolCallCompleted { run_id, .. }
            | PipelineEvent::ToolSetChanged { run_id, .. }
            | PipelineEvent::Error { run_id, .. }
            | PipelineEvent::Warning { run_id, .. } => run_id,
        }
    }

    /// Task this event belongs to, if it is task-scoped
    pub fn task(&self) -> Option<&str> {
        match self {
            PipelineEvent::TaskStarted { task, .. }
            | PipelineEvent::CacheHit { task, .. }
            | PipelineEvent::TaskCompleted { task, .. }
            | PipelineEvent::TaskFailed { task, .. }
            | PipelineEvent::IterationStarted { task, .. }
            | PipelineEvent::CandidateProduced { task, .. }
            | PipelineEvent::CritiqueReceived { task, .. }
            | PipelineEvent::Accepted { task, .. }
            | PipelineEvent::RefinementExhausted { task, .. }
            | PipelineEvent::PromptSent { task, .. }
            | PipelineEvent::ResponseCompleted { task, .. }
            | PipelineEvent::ToolCallStarted { task, .. }
            | PipelineEvent::ToolCallCompleted { task, .. }
            | PipelineEvent::ToolSetChanged { task, .. } => Some(task),
            PipelineEvent::RunStarted { .. }
            | PipelineEvent::RunCompleted { .. }
            | PipelineEvent::Error { .. }
            | PipelineEvent::Warning { .. } => None,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::RunCompleted { .. } => "RunCompleted",
            PipelineEvent::TaskStarted { .. } => "TaskStarted",
            PipelineEvent::CacheHit { .. } => "CacheHit",
            PipelineEvent::TaskCompleted { .. } => "TaskCompleted",
            PipelineEvent::TaskFailed { .. } => "TaskFailed",
            PipelineEvent::IterationStarted { .. } => "IterationStarted",
            PipelineEvent::CandidateProduced { .. } => "CandidateProduced",
            PipelineEvent::CritiqueReceived { .. } => "CritiqueReceived",
            PipelineEvent::Accepted { .. } => "Accepted",
            PipelineEvent::RefinementExhausted { .. } => "RefinementExhausted",
            PipelineEvent::PromptSent { .. } => "PromptSent",
            PipelineEvent::ResponseCompleted { .. } => "ResponseCompleted",
            PipelineEvent::ToolCallStarted { .. } => "ToolCallStarted",
            PipelineEvent::ToolCallCompleted { .. } => "ToolCallCompleted",
            PipelineEvent::ToolSetChanged { .. } => "ToolSetChanged",
            PipelineEvent::Error { .. } => "Error",
            PipelineEvent::Warning { .. } => "Warning",
        }
    }
}

/// A timestamped trace line for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub event: PipelineEvent,
}

impl TraceEntry {
    /// Create a new entry stamped with the current time
    pub fn new(event: PipelineEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: event.run_id().to_string(),
            task: event.task().map(str::to_string),
            event,
        }
    }
}

/// Shorten free text for event payloads
pub fn summarize(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() { format!("{}...", head) } else { head }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_run_id_and_task() {
        let event = PipelineEvent::CacheHit {
            run_id: "run-1".to_string(),
            task: "odds".to_string(),
        };
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(event.task(), Some("odds"));
        assert_eq!(event.event_type(), "CacheHit");

        let event = PipelineEvent::RunCompleted {
            run_id: "run-1".to_string(),
            success: true,
            duration_ms: 5,
        };
        assert_eq!(event.task(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::RefinementExhausted {
            run_id: "run-1".to_string(),
            task: "writer".to_string(),
            iterations: 3,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"RefinementExhausted\""));

        let parsed: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task(), Some("writer"));
    }

    #[test]
    fn test_trace_entry_carries_task() {
        let entry = TraceEntry::new(PipelineEvent::Accepted {
            run_id: "run-2".to_string(),
            task: "rivalry".to_string(),
            iteration: 1,
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["run_id"], "run-2");
        assert_eq!(json["task"], "rivalry");
        assert_eq!(json["event"]["type"], "Accepted");
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("short", 10), "short");
        assert_eq!(summarize("abcdefghij", 4), "abcd...");
        assert_eq!(summarize("héllo wörld", 5), "héllo...");
    }
}
