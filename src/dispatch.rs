//! Tool handlers.
//!
//! [`ToolDispatcher`] serves every tool contract: it validates the arguments,
//! leases the live session, runs the matching page operation, and renders the
//! outcome as protocol content. Arguments are always validated before the
//! session is touched, so a bad call never starts a browser.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::contracts::{
    ActInput, ExtractInput, NavigateInput, ObserveInput, ScreenshotInput, ToolContract, ToolName,
};
use crate::engine::{
    ActOptions, AutomationEngine, AutomationPage, EngineError, ExtractOptions, ObserveOptions,
    ScreenshotOptions,
};
use crate::error::GatewayError;
use crate::logging::GatewayLogger;
use crate::schema;
use crate::server::{CallToolResult, ToolHandler};
use crate::session::SessionManager;

const CATEGORY: &str = "tool";
const SCREENSHOT_MIME_TYPE: &str = "image/png";

pub struct ToolDispatcher<E: AutomationEngine> {
    sessions: Arc<SessionManager<E>>,
    logger: GatewayLogger,
}

impl<E: AutomationEngine> ToolDispatcher<E> {
    pub fn new(sessions: Arc<SessionManager<E>>, logger: GatewayLogger) -> Self {
        Self { sessions, logger }
    }

    pub fn sessions(&self) -> &SessionManager<E> {
        &self.sessions
    }

    /// Validate `arguments` against `contract` and run the tool.
    pub async fn dispatch(
        &self,
        contract: &ToolContract,
        arguments: &JsonValue,
    ) -> Result<CallToolResult, GatewayError> {
        match contract.name {
            ToolName::Navigate => self.navigate(contract.decode(arguments)?).await,
            ToolName::Act => self.act(contract.decode(arguments)?).await,
            ToolName::Extract => self.extract(contract.decode(arguments)?).await,
            ToolName::Observe => self.observe(contract.decode(arguments)?).await,
            ToolName::Screenshot => self.screenshot(contract.decode(arguments)?).await,
        }
    }

    pub async fn navigate(&self, input: NavigateInput) -> Result<CallToolResult, GatewayError> {
        let lease = self.sessions.ensure_live().await?;
        lease
            .page()?
            .goto(&input.url)
            .await
            .map_err(|err| GatewayError::engine(ToolName::Navigate, err))?;

        Ok(CallToolResult::text(format!(
            "Successfully navigated to: {}",
            input.url
        )))
    }

    pub async fn act(&self, input: ActInput) -> Result<CallToolResult, GatewayError> {
        let options = ActOptions {
            action: input.instruction.clone(),
            variables: input.variables,
        };

        let lease = self.sessions.ensure_live().await?;
        let result = lease
            .page()?
            .act(options)
            .await
            .map_err(|err| GatewayError::engine(ToolName::Act, err))?;

        Ok(CallToolResult::text(format!(
            "Action completed: {}\nResult: {}",
            input.instruction,
            pretty(ToolName::Act, &result)?
        )))
    }

    pub async fn extract(&self, input: ExtractInput) -> Result<CallToolResult, GatewayError> {
        let validator = input.schema.as_ref().map(schema::translate_value);
        let structured = validator.is_some();
        let options = ExtractOptions {
            instruction: input.instruction,
            schema: validator,
        };

        let lease = self.sessions.ensure_live().await?;
        let data = lease
            .page()?
            .extract(options)
            .await
            .map_err(|err| GatewayError::engine(ToolName::Extract, err))?;

        let text = if structured {
            pretty(
                ToolName::Extract,
                &json!({
                    "success": true,
                    "message": "Data extracted successfully",
                    "data": data,
                }),
            )?
        } else {
            format!(
                "Data extracted successfully:\n{}",
                pretty(ToolName::Extract, &data)?
            )
        };
        Ok(CallToolResult::text(text))
    }

    pub async fn observe(&self, input: ObserveInput) -> Result<CallToolResult, GatewayError> {
        let options = ObserveOptions {
            instruction: input.instruction,
        };

        let lease = self.sessions.ensure_live().await?;
        let observations = lease
            .page()?
            .observe(options)
            .await
            .map_err(|err| GatewayError::engine(ToolName::Observe, err))?;

        Ok(CallToolResult::text(format!(
            "Observation results:\n{}",
            pretty(ToolName::Observe, &observations)?
        )))
    }

    pub async fn screenshot(&self, input: ScreenshotInput) -> Result<CallToolResult, GatewayError> {
        let path = input.path.filter(|path| !path.trim().is_empty());
        let options = ScreenshotOptions {
            full_page: input.full_page,
            path: path.as_ref().map(PathBuf::from),
        };

        let lease = self.sessions.ensure_live().await?;
        let bytes = lease
            .page()?
            .screenshot(options)
            .await
            .map_err(|err| GatewayError::engine(ToolName::Screenshot, err))?;

        Ok(match path {
            Some(path) => CallToolResult::text(format!("Screenshot saved to: {path}")),
            None => CallToolResult::image(BASE64.encode(bytes), SCREENSHOT_MIME_TYPE),
        })
    }
}

#[async_trait]
impl<E: AutomationEngine> ToolHandler for ToolDispatcher<E> {
    async fn call(
        &self,
        contract: &ToolContract,
        arguments: JsonValue,
    ) -> Result<CallToolResult, GatewayError> {
        self.logger.info(
            format!("Tool called: {}", contract.name),
            Some(CATEGORY),
            None,
        );
        self.logger.debug(
            format!("Tool arguments for {}", contract.name),
            Some(CATEGORY),
            Some(arguments.clone()),
        );

        let outcome = self.dispatch(contract, &arguments).await;
        if let Err(err) = &outcome {
            self.logger.error(
                format!("Tool {} failed: {err}", contract.name),
                Some(CATEGORY),
                None,
            );
        }
        outcome
    }
}

fn pretty<T: Serialize + ?Sized>(tool: ToolName, value: &T) -> Result<String, GatewayError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| GatewayError::engine(tool, EngineError::from(err)))
}
