//! OpenAI-compatible chat completions client
//!
//! Works against OpenAI itself and against OpenRouter-style gateways that
//! speak the same `/v1/chat/completions` protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, Role,
    StopReason, TokenUsage, ToolCall,
};
use crate::config::LlmConfig;

/// Upper bound on a server-requested rate-limit pause
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// OpenAI-compatible API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    max_retries: u32,
    initial_backoff: Duration,
    request_timeout: Duration,
}

impl OpenAIClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "OpenAIClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;

        let request_timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            request_timeout,
        })
    }

    /// Model used for a request: the per-request override or the client default
    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.model)
    }

    /// Build the request body for the chat completions endpoint
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let model = self.model_for(request);
        debug!(%model, %request.max_tokens, "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(self.convert_messages(&request.messages));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // GPT-5.x and o-series models use max_completion_tokens instead of max_tokens
        let bare_model = model.rsplit('/').next().unwrap_or(model);
        let uses_completion_tokens =
            bare_model.starts_with("gpt-5") || bare_model.starts_with("o1") || bare_model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            debug!(tool_count = request.tools.len(), "build_request_body: adding tools");
            body["tools"] = serde_json::json!(request.tools.iter().map(|t| t.to_openai_schema()).collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    /// Convert internal messages to the wire format
    ///
    /// The wire format wants one `tool` message per tool result, so one
    /// internal message carrying several results fans out.
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        debug!(message_count = %messages.len(), "convert_messages: called");
        let mut result = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            match &msg.content {
                MessageContent::Text(text) => {
                    result.push(serde_json::json!({
                        "role": role,
                        "content": text,
                    }));
                }
                MessageContent::Blocks(blocks) => {
                    let mut tool_calls = Vec::new();
                    let mut tool_results = Vec::new();
                    let mut text_content = String::new();

                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => {
                                text_content.push_str(text);
                            }
                            ContentBlock::ToolUse { id, name, input } => {
                                tool_calls.push(serde_json::json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {
                                        "name": name,
                                        "arguments": input.to_string(),
                                    }
                                }));
                            }
                            ContentBlock::ToolResult {
                                tool_use_id, content, ..
                            } => {
                                tool_results.push((tool_use_id.clone(), content.clone()));
                            }
                        }
                    }

                    if !tool_results.is_empty() {
                        for (tool_call_id, content) in tool_results {
                            result.push(serde_json::json!({
                                "role": "tool",
                                "tool_call_id": tool_call_id,
                                "content": content,
                            }));
                        }
                        if !text_content.is_empty() {
                            result.push(serde_json::json!({
                                "role": role,
                                "content": text_content,
                            }));
                        }
                        continue;
                    }

                    if !tool_calls.is_empty() {
                        let mut msg = serde_json::json!({
                            "role": "assistant",
                            "tool_calls": tool_calls,
                        });
                        if !text_content.is_empty() {
                            msg["content"] = serde_json::json!(text_content);
                        }
                        result.push(msg);
                        continue;
                    }

                    result.push(serde_json::json!({
                        "role": role,
                        "content": text_content,
                    }));
                }
            }
        }

        result
    }

    /// Parse the API response
    fn parse_response(&self, api_response: OpenAIResponse) -> CompletionResponse {
        debug!(choice_count = api_response.choices.len(), "parse_response: called");
        let choice = api_response.choices.into_iter().next();

        let (content, tool_calls, stop_reason) = match choice {
            Some(c) => {
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        input: parse_arguments(&tc.function.arguments),
                    })
                    .collect();
                let content = c.message.content.filter(|s| !s.is_empty());
                (content, tool_calls, StopReason::from_finish_reason(c.finish_reason.as_deref()))
            }
            None => (None, vec![], StopReason::EndTurn),
        };

        let usage = api_response.usage.unwrap_or_default();
        CompletionResponse {
            content,
            tool_calls,
            stop_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Tool arguments arrive as a JSON string; blank or malformed means no arguments
fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!(error = %e, "parse_arguments: malformed tool arguments, using empty object");
        serde_json::json!({})
    })
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model_for(&request), %request.max_tokens, "complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let mut last_error = None;
        let mut pause: Option<Duration> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = pause.take().unwrap_or_else(|| self.backoff_for(attempt));
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "complete: retrying after transient error");
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete: network error");
                    last_error = Some(if e.is_timeout() {
                        LlmError::Timeout(self.request_timeout)
                    } else {
                        LlmError::Network(e)
                    });
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(MAX_RETRY_AFTER_SECS)
                    .min(MAX_RETRY_AFTER_SECS);
                debug!(attempt, retry_after, "complete: rate limited (429)");
                let err = LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                };
                pause = err.retry_after();
                last_error = Some(err);
                continue;
            }

            if is_retryable_status(status) && attempt < self.max_retries {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "complete: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "complete: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message: text });
            }

            let api_response: OpenAIResponse = response.json().await?;
            debug!("complete: success");
            return Ok(self.parse_response(api_response));
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// Wire response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    fn test_client(model: &str, max_tokens: u32) -> OpenAIClient {
        OpenAIClient {
            model: model.to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://openrouter.ai/api".to_string(),
            http: Client::new(),
            max_tokens,
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let client = test_client("google/gemini-2.5-flash", 8192);
        let request = CompletionRequest::new("You are helpful", "Hello", 1000);

        let body = client.build_request_body(&request);

        assert_eq!(body["model"], "google/gemini-2.5-flash");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_model_override_and_completion_tokens() {
        let client = test_client("google/gemini-2.5-flash", 8192);
        let request = CompletionRequest::new("sys", "hi", 500).with_model(Some("openai/gpt-5".to_string()));

        let body = client.build_request_body(&request);
        assert_eq!(body["model"], "openai/gpt-5");
        assert_eq!(body["max_completion_tokens"], 500);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_max_tokens_capped() {
        let client = test_client("gpt-4o", 1000);
        let body = client.build_request_body(&CompletionRequest::new("Test", "x", 5000));
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_tools_added_with_auto_choice() {
        let client = test_client("gpt-4o", 1000);
        let request = CompletionRequest::new("sys", "hi", 100).with_tools(vec![ToolDefinition::new(
            "exit_loop",
            "Stop",
            serde_json::json!({"type": "object", "properties": {}}),
        )]);
        let body = client.build_request_body(&request);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "exit_loop");
    }

    #[test]
    fn test_convert_messages_fans_out_tool_results() {
        let client = test_client("gpt-4o", 1000);
        let call = ToolCall::new("call_1", "get_team_stats", serde_json::json!({"team": "BOS"}));
        let messages = vec![
            Message::user("start"),
            Message::assistant_blocks(vec![ContentBlock::tool_use(&call)]),
            Message::user_blocks(vec![
                ContentBlock::tool_result("call_1", "{\"result\":\"ok\"}", false),
                ContentBlock::tool_result("call_2", "failed", true),
            ]),
        ];

        let converted = client.convert_messages(&messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[1]["role"], "assistant");
        assert_eq!(converted[1]["tool_calls"][0]["function"]["arguments"], "{\"team\":\"BOS\"}");
        assert_eq!(converted[2]["role"], "tool");
        assert_eq!(converted[2]["tool_call_id"], "call_1");
        assert_eq!(converted[3]["tool_call_id"], "call_2");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let client = test_client("gpt-4o", 1000);
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "exit_loop", "arguments": "" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        });
        let parsed: OpenAIResponse = serde_json::from_value(raw).unwrap();

        let response = client.parse_response(parsed);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].input, serde_json::json!({}));
        assert_eq!(response.usage.input_tokens, 12);
        assert!(response.content.is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let client = test_client("gpt-4o", 1000);
        assert_eq!(client.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(client.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(client.backoff_for(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_timeout_reports_request_timeout() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let request_timeout = Duration::from_millis(150);
        let client = OpenAIClient {
            base_url: format!("http://{}", addr),
            http: Client::builder().timeout(request_timeout).build().unwrap(),
            max_retries: 1,
            initial_backoff: Duration::from_millis(5),
            request_timeout,
            ..test_client("gpt-4o", 1000)
        };

        let err = client
            .complete(CompletionRequest::new("sys", "hi", 10))
            .await
            .unwrap_err();
        match err {
            LlmError::Timeout(after) => assert_eq!(after, request_timeout),
            other => panic!("expected timeout, got {:?}", other),
        }
        server.abort();
    }
}
