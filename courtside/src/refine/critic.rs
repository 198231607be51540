//! Critic - judges a candidate and either accepts it or returns feedback

use serde_json::json;

use crate::llm::{CompletionResponse, ToolDefinition};

/// Name of the argument-less accept signal
pub const EXIT_TOOL_NAME: &str = "exit_loop";

/// A critic definition shared by every task that uses it
#[derive(Debug, Clone)]
pub struct Critic {
    pub name: String,
    /// Template with `{{output}}` standing for the candidate
    pub instructions: String,
    /// Model override; the task's model is used when absent
    pub model: Option<String>,
}

impl Critic {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// What the critic decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Feedback for the next worker step; may be empty
    Revise(String),
}

impl Verdict {
    /// Accept only on an `exit_loop` call, never on wording
    pub fn from_response(response: &CompletionResponse) -> Self {
        if response.tool_calls.iter().any(|c| c.name == EXIT_TOOL_NAME) {
            Verdict::Accept
        } else {
            Verdict::Revise(response.content.as_deref().unwrap_or("").trim().to_string())
        }
    }
}

/// The only tool offered to a critic
pub fn exit_tool_definition() -> ToolDefinition {
    ToolDefinition::new(
        EXIT_TOOL_NAME,
        "Call this function ONLY when the task output fully satisfies the instructions \
         and no further changes are needed.",
        json!({ "type": "object", "properties": {} }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    #[test]
    fn test_exit_call_accepts() {
        let response = CompletionResponse::tool_calls(vec![ToolCall::new("c1", EXIT_TOOL_NAME, json!({}))]);
        assert_eq!(Verdict::from_response(&response), Verdict::Accept);
    }

    #[test]
    fn test_prose_approval_is_not_acceptance() {
        let response = CompletionResponse::text("  Looks complete, approved!  ");
        assert_eq!(
            Verdict::from_response(&response),
            Verdict::Revise("Looks complete, approved!".to_string())
        );
    }

    #[test]
    fn test_exit_call_with_text_still_accepts() {
        let mut response = CompletionResponse::tool_calls(vec![ToolCall::new("c1", EXIT_TOOL_NAME, json!({}))]);
        response.content = Some("Done.".to_string());
        assert_eq!(Verdict::from_response(&response), Verdict::Accept);
    }

    #[test]
    fn test_empty_reply_is_empty_revision() {
        let mut response = CompletionResponse::text("");
        response.content = None;
        assert_eq!(Verdict::from_response(&response), Verdict::Revise(String::new()));
    }
}
