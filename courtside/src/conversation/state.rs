//! ConversationState - transcript and visible tools of one conversation

use crate::llm::{ContentBlock, Message, MessageContent, ToolDefinition};

/// State owned by one conversation loop invocation
///
/// The transcript is append-only. `visible_tools` is replaced wholesale by a
/// category selection, never merged.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub system: String,
    pub transcript: Vec<Message>,
    pub visible_tools: Vec<ToolDefinition>,
    /// Model exchanges so far
    pub turns: u32,
}

impl ConversationState {
    pub fn new(system: impl Into<String>, user: impl Into<String>, visible_tools: Vec<ToolDefinition>) -> Self {
        Self {
            system: system.into(),
            transcript: vec![Message::user(user)],
            visible_tools,
            turns: 0,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn visible_tool_names(&self) -> Vec<&str> {
        self.visible_tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Text of the most recent turn, for telemetry
    pub fn last_turn_text(&self) -> String {
        match self.transcript.last().map(|m| &m.content) {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.clone(),
                    ContentBlock::ToolUse { name, .. } => format!("[tool_use {}]", name),
                    ContentBlock::ToolResult { content, .. } => content.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}
