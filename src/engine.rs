//! Automation engine boundary.
//!
//! The gateway never talks to a browser directly. It drives an
//! [`AutomationEngine`], which starts [`AutomationSession`]s, each exposing at
//! most one [`AutomationPage`] that the tools operate on. The crate ships a
//! chromiumoxide-backed engine in [`crate::runtime`]; tests plug in recording
//! stubs.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::llm::LlmError;
use crate::schema::Validator;

/// Options controlling the `act` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActOptions {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, String>>,
}

/// Result returned after executing an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActResult {
    pub success: bool,
    pub message: String,
    pub action: String,
}

/// Options controlling the `extract` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOptions {
    pub instruction: Option<String>,
    /// Shape the extracted data must satisfy.
    pub schema: Option<Validator>,
}

/// Options controlling the `observe` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub instruction: Option<String>,
}

/// One actionable element found on the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObserveResult {
    pub selector: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    /// Also write the image here; the format follows the extension.
    pub path: Option<PathBuf>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: true,
            path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Startup(String),
    #[error("{0}")]
    Operation(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl EngineError {
    pub fn operation(message: impl Into<String>) -> Self {
        EngineError::Operation(message.into())
    }
}

/// Factory for automation sessions.
#[async_trait]
pub trait AutomationEngine: Send + Sync + 'static {
    type Session: AutomationSession;

    /// Start a session and run its startup sequence to completion.
    async fn start(&self, config: &GatewayConfig) -> Result<Self::Session, EngineError>;
}

/// A live automation session.
#[async_trait]
pub trait AutomationSession: Send + Sync + 'static {
    type Page: AutomationPage;

    /// The page tools operate on, if the session exposes one.
    fn page(&self) -> Option<&Self::Page>;

    async fn close(self) -> Result<(), EngineError>;
}

/// Page-level operations backing the five tools.
#[async_trait]
pub trait AutomationPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    async fn act(&self, options: ActOptions) -> Result<ActResult, EngineError>;

    async fn extract(&self, options: ExtractOptions) -> Result<JsonValue, EngineError>;

    async fn observe(&self, options: ObserveOptions) -> Result<Vec<ObserveResult>, EngineError>;

    /// Capture a PNG of the page.
    async fn screenshot(&self, options: ScreenshotOptions) -> Result<Vec<u8>, EngineError>;
}
