//! ToolBackend trait - the boundary to an external tool collaborator

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ToolError;
use crate::llm::ToolDefinition;

/// One entry in a backend's tool catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments; `{}` when the backend supplies none
    pub input_schema: Value,
    /// Category tags as published by the backend
    pub categories: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            categories: Vec::new(),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// The callable-function schema offered to the model
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.input_schema.clone())
    }
}

/// Result of one successful tool invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Structured payload, passed through unchanged when present
    pub structured: Option<Value>,
    /// Text fragments in the order the backend returned them
    pub texts: Vec<String>,
}

impl ToolOutput {
    pub fn structured(value: Value) -> Self {
        Self {
            structured: Some(value),
            texts: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            structured: None,
            texts: vec![text.into()],
        }
    }

    /// The result envelope: structured payload, else `{"result": texts}`
    pub fn payload(&self) -> Value {
        match &self.structured {
            Some(value) => value.clone(),
            None => json!({ "result": self.texts.join("\n") }),
        }
    }

    /// Serialized envelope for a tool-result turn
    pub fn to_content(&self) -> String {
        self.payload().to_string()
    }
}

/// Payload appended in place of a result when a tool call fails
pub fn error_payload(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// An external collaborator exposing a catalog of invocable tools
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Backend name used for routing and configuration
    fn name(&self) -> &str;

    /// Tool catalog, fixed for the life of the backend
    fn catalog(&self) -> &[ToolDescriptor];

    /// Tools of this backend are visible before any category selection
    fn always_visible(&self) -> bool {
        false
    }

    /// Calls must not overlap (e.g. a single long-lived session)
    fn requires_serialized_access(&self) -> bool {
        false
    }

    /// Invoke one tool
    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError>;
}
