//! Transport-facing tool registry.
//!
//! A [`ToolServer`] holds the registered tool contracts and the handler that
//! serves each of them. Transports list tools and route calls through it; they
//! never see the session or the engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::contracts::ToolContract;
use crate::error::GatewayError;
use crate::logging::GatewayLogger;

/// Serves invocations of one or more registered tools.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        contract: &ToolContract,
        arguments: JsonValue,
    ) -> Result<CallToolResult, GatewayError>;
}

/// A content item returned from a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result envelope of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Image {
                data: data.into(),
                mime_type: mime_type.into(),
            }],
            is_error: false,
        }
    }

    /// Tool-execution failure reported to the caller as content.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }
}

/// Tool metadata advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

struct RegisteredTool {
    contract: ToolContract,
    handler: Arc<dyn ToolHandler>,
}

pub struct ToolServer {
    info: ServerInfo,
    logger: GatewayLogger,
    tools: Vec<RegisteredTool>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>, logger: GatewayLogger) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            logger,
            tools: Vec::new(),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn logger(&self) -> &GatewayLogger {
        &self.logger
    }

    /// Register a tool, replacing any previous registration under the same
    /// name. Returns the replaced contract.
    pub fn register_tool(
        &mut self,
        contract: ToolContract,
        handler: Arc<dyn ToolHandler>,
    ) -> Option<ToolContract> {
        let entry = RegisteredTool { contract, handler };
        match self
            .tools
            .iter_mut()
            .find(|tool| tool.contract.name == entry.contract.name)
        {
            Some(existing) => Some(std::mem::replace(existing, entry).contract),
            None => {
                self.tools.push(entry);
                None
            }
        }
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn contract(&self, name: &str) -> Option<&ToolContract> {
        self.find(name).map(|tool| &tool.contract)
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.contract.name.as_str().to_string(),
                title: tool.contract.title.to_string(),
                description: tool.contract.description.to_string(),
                input_schema: tool.contract.input_schema(),
            })
            .collect()
    }

    /// Route a call to the tool's handler. Missing arguments count as `{}`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonValue>,
    ) -> Result<CallToolResult, GatewayError> {
        let tool = self
            .find(name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;

        let arguments = match arguments {
            None | Some(JsonValue::Null) => json!({}),
            Some(value) => value,
        };

        tool.handler.call(&tool.contract, arguments).await
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools
            .iter()
            .find(|tool| tool.contract.name.as_str() == name)
    }
}
