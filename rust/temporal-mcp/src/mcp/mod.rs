//! Model Context Protocol server.
//!
//! JSON-RPC 2.0 message types and the method dispatcher shared by the stdio
//! and HTTP transports. Each request runs with its own cancellation token,
//! a child of the process shutdown token, so `notifications/cancelled` and
//! shutdown both reach in-flight tool calls.

pub mod http;
pub mod stdio;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::logging::OpTimer;
use crate::tools::ToolRegistry;

pub const JSONRPC_VERSION: &str = "2.0";
/// Protocol revision offered when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "temporal-mcp";

/// URI of the history-reading guide resource.
pub const INSTRUCTIONS_URI: &str = "temporal://instructions";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// The request was cancelled before it completed.
pub const REQUEST_CANCELLED: i64 = -32800;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_CANCELLED: &str = "notifications/cancelled";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";

/// JSON-RPC request id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the request id could not be determined.
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// Malformed input; the response must be sent back as-is.
    Invalid(JsonRpcResponse),
    /// A response from the client; the server never issues requests.
    Ignored,
}

/// Decode one JSON-RPC message.
pub fn parse_message(text: &str) -> Incoming {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            return Incoming::Invalid(JsonRpcResponse::failure(
                None,
                PARSE_ERROR,
                format!("parse error: {e}"),
            ));
        }
    };

    let raw: RawMessage = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            return Incoming::Invalid(JsonRpcResponse::failure(
                None,
                INVALID_REQUEST,
                format!("invalid request: {e}"),
            ));
        }
    };

    let params = raw.params.unwrap_or(Value::Null);
    match (raw.id, raw.method) {
        (Some(id), Some(method)) => Incoming::Request { id, method, params },
        (None, Some(method)) => Incoming::Notification { method, params },
        (_, None) if raw.result.is_some() || raw.error.is_some() => Incoming::Ignored,
        (id, None) => Incoming::Invalid(JsonRpcResponse::failure(
            id,
            INVALID_REQUEST,
            "invalid request: missing method",
        )),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ToolCallParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceReadParams {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelledParams {
    request_id: RequestId,
    #[serde(default)]
    reason: Option<String>,
}

/// Dispatches MCP methods to the tool registry.
pub struct McpServer {
    tools: ToolRegistry,
    instructions: Arc<str>,
    shutdown: CancellationToken,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl fmt::Debug for McpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.tools)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Create a server whose request tokens descend from `shutdown`.
    pub fn new(tools: ToolRegistry, instructions: Arc<str>, shutdown: CancellationToken) -> Self {
        Self {
            tools,
            instructions,
            shutdown,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Track a request and hand out its cancellation token. Ids must be
    /// unique within one session; the stdio transport is that session.
    pub fn register_request(&self, id: &RequestId) -> CancellationToken {
        let token = self.shutdown.child_token();
        self.in_flight.lock().insert(id.clone(), token.clone());
        token
    }

    /// Stop tracking a finished request.
    pub fn complete_request(&self, id: &RequestId) {
        self.in_flight.lock().remove(id);
    }

    /// Number of requests currently tracked.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Handle one raw message end to end. `None` means nothing is sent back
    /// because the message was a notification or a client response.
    ///
    /// Requests handled here are not tracked for `notifications/cancelled`:
    /// their ids are only unique per client, and this entry point serves
    /// callers that share no session. A request interrupted by shutdown is
    /// answered with [`REQUEST_CANCELLED`].
    pub async fn handle_message(&self, text: &str) -> Option<JsonRpcResponse> {
        match parse_message(text) {
            Incoming::Request { id, method, params } => {
                let cancel = self.shutdown.child_token();
                let response = self.handle_request(id.clone(), &method, params, &cancel).await;
                Some(if cancel.is_cancelled() {
                    JsonRpcResponse::failure(Some(id), REQUEST_CANCELLED, "request cancelled")
                } else {
                    response
                })
            }
            Incoming::Notification { method, params } => {
                self.handle_notification(&method, params);
                None
            }
            Incoming::Invalid(response) => Some(response),
            Incoming::Ignored => None,
        }
    }

    /// Dispatch one request to its method handler.
    pub async fn handle_request(
        &self,
        id: RequestId,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        debug!(%id, method, "Handling request");
        let result = match method {
            METHOD_INITIALIZE => Ok(Self::initialize(&params)),
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => Ok(json!({ "tools": self.tools.definitions() })),
            METHOD_TOOLS_CALL => self.call_tool(params, cancel).await,
            METHOD_RESOURCES_LIST => Ok(Self::list_resources()),
            METHOD_RESOURCES_READ => self.read_resource(params),
            other => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("method not found: {other}"),
                data: None,
            }),
        };

        match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: Some(id),
                result: None,
                error: Some(error),
            },
        }
    }

    /// Handle a notification; nothing is ever sent back.
    pub fn handle_notification(&self, method: &str, params: Value) {
        match method {
            METHOD_INITIALIZED => info!("Client initialized"),
            METHOD_CANCELLED => match serde_json::from_value::<CancelledParams>(params) {
                Ok(cancelled) => {
                    let token = self.in_flight.lock().get(&cancelled.request_id).cloned();
                    match token {
                        Some(token) => {
                            info!(
                                request_id = %cancelled.request_id,
                                reason = cancelled.reason.as_deref().unwrap_or_default(),
                                "Cancelling request"
                            );
                            token.cancel();
                        }
                        None => debug!(
                            request_id = %cancelled.request_id,
                            "Cancellation for unknown request"
                        ),
                    }
                }
                Err(e) => warn!(error = %e, "Malformed cancellation notification"),
            },
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn initialize(params: &Value) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn call_tool(
        &self,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams =
            serde_json::from_value(params).map_err(|e| invalid_params(e.to_string()))?;
        let name = params
            .name
            .ok_or_else(|| invalid_params("missing tool name".to_string()))?;
        let tool = self
            .tools
            .get(&name)
            .ok_or_else(|| invalid_params(format!("unknown tool: {name}")))?;

        let timer = OpTimer::new("tool", name.as_str());
        let outcome = tool.execute(params.arguments, cancel).await;
        timer.finish_with_result(outcome.as_ref());

        Ok(match outcome {
            Ok(text) => tool_result(text, false),
            Err(e) => tool_result(e.to_string(), true),
        })
    }

    fn list_resources() -> Value {
        json!({
            "resources": [{
                "uri": INSTRUCTIONS_URI,
                "name": "guide",
                "description": "Guide for understanding workflow histories",
                "mimeType": "text/plain"
            }]
        })
    }

    fn read_resource(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: ResourceReadParams =
            serde_json::from_value(params).map_err(|e| invalid_params(e.to_string()))?;
        match params.uri.as_deref() {
            Some(INSTRUCTIONS_URI) => Ok(json!({
                "contents": [{
                    "uri": INSTRUCTIONS_URI,
                    "mimeType": "text/plain",
                    "text": &*self.instructions
                }]
            })),
            Some(other) => Err(invalid_params(format!("unknown resource: {other}"))),
            None => Err(invalid_params("missing resource uri".to_string())),
        }
    }
}

fn invalid_params(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message,
        data: None,
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}
