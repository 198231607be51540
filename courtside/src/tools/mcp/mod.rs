//! MCP backend: a stdio MCP server exposed as a `ToolBackend`
//!
//! The catalog is listed once at connect. Calls go through one long-lived
//! session, so the backend requires serialized access.

mod session;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use session::{McpError, McpSession, PROTOCOL_VERSION};

use super::{ToolBackend, ToolDescriptor, ToolError, ToolOutput};
use crate::config::BackendConfig;

/// Tool backend backed by an MCP server process
pub struct McpBackend {
    name: String,
    session: Mutex<McpSession>,
    catalog: Vec<ToolDescriptor>,
    always_visible: bool,
    timeout: Duration,
}

impl McpBackend {
    /// Spawn the configured server, handshake and list its tools
    pub async fn connect(config: &BackendConfig) -> Result<Self, ToolError> {
        debug!(name = %config.name, command = %config.command, "McpBackend::connect: called");
        let timeout = config.timeout();
        let mut session = McpSession::spawn(&config.command, &config.args, &config.env, timeout)
            .await
            .map_err(|e| ToolError::Transport(format!("{}: {}", config.name, e)))?;

        let catalog = list_all_tools(&mut session)
            .await
            .map_err(|e| ToolError::Transport(format!("{}: {}", config.name, e)))?;
        info!(name = %config.name, tools = catalog.len(), "McpBackend::connect: catalog loaded");

        Ok(Self {
            name: config.name.clone(),
            session: Mutex::new(session),
            catalog,
            always_visible: config.always_visible,
            timeout,
        })
    }
}

/// Follow `nextCursor` until the catalog is complete
async fn list_all_tools(session: &mut McpSession) -> Result<Vec<ToolDescriptor>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let params = match &cursor {
            Some(c) => json!({ "cursor": c }),
            None => json!({}),
        };
        let result = session.request("tools/list", params).await?;
        let (page, next) = parse_list_tools_result(&result).map_err(|message| McpError::Rpc { code: 0, message })?;
        tools.extend(page);
        match next {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }
    Ok(tools)
}

/// Parse a `tools/list` result into descriptors and the next cursor
fn parse_list_tools_result(result: &Value) -> Result<(Vec<ToolDescriptor>, Option<String>), String> {
    let tools = result
        .get("tools")
        .ok_or_else(|| "no tools in response".to_string())?
        .as_array()
        .ok_or_else(|| "tools not an array".to_string())?;

    let mut descriptors = Vec::with_capacity(tools.len());
    for tool in tools {
        let obj = tool.as_object().ok_or_else(|| "tool item not an object".to_string())?;
        let name = obj.get("name").and_then(Value::as_str).unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }
        let description = obj.get("description").and_then(Value::as_str).unwrap_or("").to_string();
        let input_schema = obj
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        descriptors.push(ToolDescriptor::new(name, description, input_schema).with_categories(categories_of(obj)));
    }

    let next = result.get("nextCursor").and_then(Value::as_str).map(str::to_string);
    Ok((descriptors, next))
}

/// Category tags from `_meta.category` or `meta.category` (string or list)
fn categories_of(tool: &Map<String, Value>) -> Vec<String> {
    let tag = ["_meta", "meta"]
        .iter()
        .filter_map(|key| tool.get(*key))
        .find_map(|meta| meta.get("category"));
    match tag {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Parse a `tools/call` result into the result envelope
fn parse_call_tool_result(tool: &str, result: Value) -> Result<ToolOutput, ToolError> {
    let texts: Vec<String> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        let message = if texts.is_empty() {
            "tool returned error".to_string()
        } else {
            texts.join("\n")
        };
        return Err(ToolError::Backend {
            tool: tool.to_string(),
            message,
        });
    }

    let structured = result.get("structuredContent").filter(|v| !v.is_null()).cloned();
    Ok(ToolOutput { structured, texts })
}

#[async_trait]
impl ToolBackend for McpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    fn always_visible(&self) -> bool {
        self.always_visible
    }

    fn requires_serialized_access(&self) -> bool {
        true
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        debug!(backend = %self.name, %tool, "McpBackend::call: called");
        let mut session = self.session.lock().await;
        let result = session
            .request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
            .map_err(|e| match e {
                McpError::Timeout(..) => ToolError::Timeout {
                    tool: tool.to_string(),
                    timeout: self.timeout,
                },
                McpError::Rpc { message, .. } => ToolError::Backend {
                    tool: tool.to_string(),
                    message,
                },
                other => ToolError::Transport(other.to_string()),
            })?;
        parse_call_tool_result(tool, result)
    }
}

#[cfg(test)]
mod tests {
    use super::session::tests::write_python_server;
    use super::*;
    use std::collections::BTreeMap;

    const STATS_SERVER: &str = r#"
import json, sys

PAGE1 = [
    {"name": "get_tools_by_category", "description": "select", "inputSchema": {"type": "object"}, "_meta": {"category": "base"}},
    {"name": "get_team_performance", "description": "Team form", "inputSchema": {"type": "object", "properties": {"team1": {"type": "string"}}}, "_meta": {"category": "team"}},
]
PAGE2 = [
    {"name": "get_player_stats", "description": "Players", "meta": {"category": ["player", "season"]}},
]

for raw in sys.stdin:
    raw = raw.strip()
    if not raw:
        continue
    msg = json.loads(raw)
    method = msg.get("method")
    if "id" not in msg or method is None:
        continue
    if method == "initialize":
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"result":{"protocolVersion":"2025-11-25","capabilities":{"tools":{}}}}), flush=True)
    elif method == "tools/list":
        if msg["params"].get("cursor") == "p2":
            result = {"tools": PAGE2}
        else:
            result = {"tools": PAGE1, "nextCursor": "p2"}
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"result":result}), flush=True)
    elif method == "tools/call":
        name = msg["params"]["name"]
        args = msg["params"]["arguments"]
        if name == "get_team_performance":
            result = {"content": [{"type": "text", "text": "ignored"}], "structuredContent": {"team": args.get("team1"), "wins": 41}}
        elif name == "get_player_stats":
            result = {"content": [{"type": "text", "text": "line one"}, {"type": "image", "data": ""}, {"type": "text", "text": "line two"}]}
        else:
            result = {"content": [{"type": "text", "text": "unknown team"}], "isError": True}
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"result":result}), flush=True)
"#;

    async fn connect() -> (tempfile::TempDir, McpBackend) {
        let (dir, path) = write_python_server(STATS_SERVER);
        let config = BackendConfig {
            name: "nba".to_string(),
            command: "python3".to_string(),
            args: vec![path],
            env: BTreeMap::new(),
            always_visible: false,
            timeout_ms: 5000,
        };
        let backend = McpBackend::connect(&config).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_connect_lists_all_pages_with_categories() {
        let (_dir, backend) = connect().await;
        let names: Vec<_> = backend.catalog().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_tools_by_category", "get_team_performance", "get_player_stats"]);
        assert_eq!(backend.catalog()[1].categories, vec!["team"]);
        assert_eq!(backend.catalog()[2].categories, vec!["player", "season"]);
        assert_eq!(backend.catalog()[2].input_schema, json!({}));
        assert!(backend.requires_serialized_access());
    }

    #[tokio::test]
    async fn test_call_structured_and_text_results() {
        let (_dir, backend) = connect().await;

        let output = backend
            .call("get_team_performance", json!({"team1": "Celtics"}))
            .await
            .unwrap();
        assert_eq!(output.payload(), json!({"team": "Celtics", "wins": 41}));

        let output = backend.call("get_player_stats", json!({})).await.unwrap();
        assert_eq!(output.payload(), json!({"result": "line one\nline two"}));
    }

    #[tokio::test]
    async fn test_call_is_error_becomes_backend_error() {
        let (_dir, backend) = connect().await;
        let err = backend.call("get_unknown", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Backend { ref message, .. } if message == "unknown team"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_list_tools_result_errors() {
        assert!(parse_list_tools_result(&json!({})).is_err());
        assert!(parse_list_tools_result(&json!({"tools": {}})).is_err());
        let (tools, next) = parse_list_tools_result(&json!({"tools": [{"name": ""}, {"name": "x"}]})).unwrap();
        assert_eq!(tools.len(), 1);
        assert!(next.is_none());
    }
}
