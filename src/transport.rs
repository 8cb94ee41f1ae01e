//! Newline-delimited JSON-RPC 2.0 transport.
//!
//! [`serve`] reads one request per line, answers it through a [`ToolServer`],
//! and writes one response per line. Requests are handled in order. The loop
//! ends cleanly when the reader reaches end of input.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::GatewayError;
use crate::server::{CallToolResult, ServerInfo, ToolServer};

/// Protocol revision this server implements.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Revisions accepted from clients and echoed back during `initialize`.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

const CATEGORY: &str = "transport";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// An inbound frame. Frames without an `id` are notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonValue, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Deserialize)]
struct ToolsCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<JsonValue>,
}

/// Serve requests from `reader` until end of input.
///
/// A frame that is not valid UTF-8 gets a parse error and the loop continues.
pub async fn serve<R, W>(server: &ToolServer, mut reader: R, mut writer: W) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let logger = server.logger();
    let mut buffer = Vec::new();

    logger.info("Transport ready", Some(CATEGORY), None);

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&buffer) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(server, line).await
            }
            Err(err) => {
                logger.error(format!("Frame is not valid UTF-8: {err}"), Some(CATEGORY), None);
                Some(JsonRpcResponse::failure(
                    JsonValue::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {err}")),
                ))
            }
        };

        if let Some(response) = response {
            let mut frame = serde_json::to_string(&response)?;
            frame.push('\n');
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    logger.info("Transport closed", Some(CATEGORY), None);
    Ok(())
}

/// Handle one raw frame. Returns `None` for notifications and for frames
/// carrying neither an id nor a method. A frame with an id but no method is
/// answered with an invalid-request error.
pub async fn handle_line(server: &ToolServer, line: &str) -> Option<JsonRpcResponse> {
    let message: JsonRpcMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(err) => {
            server
                .logger()
                .error(format!("Unparseable frame: {err}"), Some(CATEGORY), None);
            return Some(JsonRpcResponse::failure(
                JsonValue::Null,
                JsonRpcError::new(PARSE_ERROR, format!("Parse error: {err}")),
            ));
        }
    };

    let (id, method) = match (message.id, message.method) {
        (Some(id), Some(method)) => (id, method),
        (None, Some(method)) => {
            server.logger().debug(
                format!("Notification received: {method}"),
                Some(CATEGORY),
                None,
            );
            return None;
        }
        (Some(id), None) => {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "Invalid request: missing method"),
            ));
        }
        (None, None) => return None,
    };

    server
        .logger()
        .debug(format!("Request: {method}"), Some(CATEGORY), Some(id.clone()));

    Some(match handle_request(server, &method, message.params).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn handle_request(
    server: &ToolServer,
    method: &str,
    params: Option<JsonValue>,
) -> Result<JsonValue, JsonRpcError> {
    match method {
        "initialize" => to_result(initialize(server, params.as_ref())),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": server.list_tools() })),
        "tools/call" => {
            let params: ToolsCallParams = params
                .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing params"))
                .and_then(|value| {
                    serde_json::from_value(value).map_err(|err| {
                        JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {err}"))
                    })
                })?;
            to_result(call_tool(server, params).await?)
        }
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

fn initialize(server: &ToolServer, params: Option<&JsonValue>) -> InitializeResult {
    let requested = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(JsonValue::as_str);

    let protocol_version = requested
        .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
        .unwrap_or(PROTOCOL_VERSION);

    InitializeResult {
        protocol_version: protocol_version.to_string(),
        capabilities: ServerCapabilities::default(),
        server_info: server.info().clone(),
    }
}

async fn call_tool(
    server: &ToolServer,
    params: ToolsCallParams,
) -> Result<CallToolResult, JsonRpcError> {
    match server.call_tool(&params.name, params.arguments).await {
        Ok(result) => Ok(result),
        Err(GatewayError::UnknownTool(name)) => Err(JsonRpcError::new(
            INVALID_PARAMS,
            format!("Unknown tool: {name}"),
        )),
        Err(err) => Ok(CallToolResult::error(err.to_string())),
    }
}

fn to_result<T: Serialize>(value: T) -> Result<JsonValue, JsonRpcError> {
    serde_json::to_value(value).map_err(|err| JsonRpcError::new(INTERNAL_ERROR, err.to_string()))
}
