//! Event Bus - pub/sub for pipeline run telemetry
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. Components never reach for ambient state: each receives an
//! `EventEmitter` handle explicitly and passes it down.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{PipelineEvent, summarize};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Summary length for prompts, responses and tool payloads
const SUMMARY_CHARS: usize = 200;

/// Central event bus for one process
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            run_id,
            task: None,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for components to emit events without owning the bus
///
/// Cheap to clone. Bound to a run id and, once scoped with
/// [`EventEmitter::for_task`], to a task name.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: broadcast::Sender<PipelineEvent>,
    run_id: String,
    task: Option<String>,
}

impl EventEmitter {
    /// An emitter on a private channel nobody listens to
    pub fn detached(run_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            run_id: run_id.into(),
            task: None,
        }
    }

    /// A child emitter scoped to one task
    pub fn for_task(&self, task: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            run_id: self.run_id.clone(),
            task: Some(task.into()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    fn task_name(&self) -> String {
        self.task.clone().unwrap_or_default()
    }

    /// Emit a raw event
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn run_started(&self, root: &str, entity_a: &str, entity_b: &str, game_date: &str) {
        self.emit(PipelineEvent::RunStarted {
            run_id: self.run_id.clone(),
            root: root.to_string(),
            entity_a: entity_a.to_string(),
            entity_b: entity_b.to_string(),
            game_date: game_date.to_string(),
        });
    }

    pub fn run_completed(&self, success: bool, duration_ms: u64) {
        self.emit(PipelineEvent::RunCompleted {
            run_id: self.run_id.clone(),
            success,
            duration_ms,
        });
    }

    pub fn task_started(&self, kind: &str) {
        self.emit(PipelineEvent::TaskStarted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            kind: kind.to_string(),
        });
    }

    pub fn cache_hit(&self) {
        self.emit(PipelineEvent::CacheHit {
            run_id: self.run_id.clone(),
            task: self.task_name(),
        });
    }

    pub fn task_completed(&self, output: &str, duration_ms: u64) {
        self.emit(PipelineEvent::TaskCompleted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            output_summary: summarize(output, SUMMARY_CHARS),
            duration_ms,
        });
    }

    pub fn task_failed(&self, error: &str) {
        self.emit(PipelineEvent::TaskFailed {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            error: error.to_string(),
        });
    }

    pub fn iteration_started(&self, iteration: u32, revising: bool) {
        self.emit(PipelineEvent::IterationStarted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            iteration,
            revising,
        });
    }

    pub fn candidate_produced(&self, iteration: u32, candidate: &str) {
        self.emit(PipelineEvent::CandidateProduced {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            iteration,
            summary: summarize(candidate, SUMMARY_CHARS),
        });
    }

    pub fn critique_received(&self, iteration: u32, critique: &str) {
        self.emit(PipelineEvent::CritiqueReceived {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            iteration,
            critique: critique.to_string(),
        });
    }

    pub fn accepted(&self, iteration: u32) {
        self.emit(PipelineEvent::Accepted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            iteration,
        });
    }

    pub fn refinement_exhausted(&self, iterations: u32) {
        self.emit(PipelineEvent::RefinementExhausted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            iterations,
        });
    }

    pub fn prompt_sent(&self, turn: u32, prompt: &str, tool_count: usize) {
        self.emit(PipelineEvent::PromptSent {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            turn,
            prompt_summary: summarize(prompt, SUMMARY_CHARS),
            tool_count,
        });
    }

    pub fn response_completed(
        &self,
        turn: u32,
        response: &str,
        input_tokens: u64,
        output_tokens: u64,
        has_tool_calls: bool,
    ) {
        self.emit(PipelineEvent::ResponseCompleted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            turn,
            response_summary: summarize(response, SUMMARY_CHARS),
            input_tokens,
            output_tokens,
            has_tool_calls,
        });
    }

    pub fn tool_call_started(&self, tool_name: &str, args: &str) {
        self.emit(PipelineEvent::ToolCallStarted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            tool_name: tool_name.to_string(),
            tool_args_summary: summarize(args, SUMMARY_CHARS),
        });
    }

    pub fn tool_call_completed(&self, tool_name: &str, success: bool, result: &str, duration_ms: u64) {
        self.emit(PipelineEvent::ToolCallCompleted {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            tool_name: tool_name.to_string(),
            success,
            result_summary: summarize(result, SUMMARY_CHARS),
            duration_ms,
        });
    }

    pub fn tool_set_changed(&self, categories: Vec<String>, tool_count: usize) {
        self.emit(PipelineEvent::ToolSetChanged {
            run_id: self.run_id.clone(),
            task: self.task_name(),
            categories,
            tool_count,
        });
    }

    pub fn error(&self, context: &str, message: &str) {
        self.emit(PipelineEvent::Error {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }

    pub fn warning(&self, context: &str, message: &str) {
        self.emit(PipelineEvent::Warning {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(100);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(100);
        bus.emit(PipelineEvent::RunCompleted {
            run_id: "run-1".to_string(),
            success: true,
            duration_ms: 0,
        });
    }

    #[tokio::test]
    async fn test_task_scoped_emitter() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-7");
        let scoped = emitter.for_task("odds");

        scoped.task_started("composite");
        scoped.iteration_started(0, false);
        scoped.tool_call_started("search", "{\"q\":\"odds\"}");
        scoped.tool_call_completed("search", true, "BOS -3.5", 12);
        scoped.refinement_exhausted(3);

        for _ in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.run_id(), "run-7");
            assert_eq!(event.task(), Some("odds"));
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(emitter.task(), None);
    }

    #[tokio::test]
    async fn test_summaries_are_truncated() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-8").for_task("writer");

        emitter.prompt_sent(1, &"x".repeat(500), 3);

        match rx.recv().await.unwrap() {
            PipelineEvent::PromptSent { prompt_summary, tool_count, .. } => {
                assert_eq!(prompt_summary.len(), 203);
                assert_eq!(tool_count, 3);
            }
            other => panic!("Expected PromptSent, got {:?}", other),
        }
    }

    #[test]
    fn test_detached_emitter_never_fails() {
        let emitter = EventEmitter::detached("run-x").for_task("t");
        emitter.cache_hit();
        emitter.error("ctx", "msg");
        assert_eq!(emitter.run_id(), "run-x");
    }
}
