//! Gateway assembly.

use std::sync::Arc;

use crate::config::{GatewayConfig, GatewayConfigOverrides};
use crate::contracts::contract_set;
use crate::dispatch::ToolDispatcher;
use crate::engine::AutomationEngine;
use crate::logging::GatewayLogger;
use crate::server::{ToolHandler, ToolServer};
use crate::session::SessionManager;

pub const SERVER_NAME: &str = "stagehand-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A tool server with all five tools registered against one lazily started
/// automation session.
///
/// Construction never touches the engine; the first tool call does.
pub struct StagehandGateway<E: AutomationEngine> {
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionManager<E>>,
    server: ToolServer,
    logger: GatewayLogger,
}

impl<E: AutomationEngine> StagehandGateway<E> {
    /// Resolve `overrides` against defaults and build the gateway.
    pub fn new(overrides: GatewayConfigOverrides, engine: E) -> Self {
        Self::with_config(GatewayConfig::resolve(overrides), engine)
    }

    pub fn with_config(config: GatewayConfig, engine: E) -> Self {
        let logger = GatewayLogger::new(config.verbose);
        Self::with_logger(config, engine, logger)
    }

    pub fn with_logger(config: GatewayConfig, engine: E, logger: GatewayLogger) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(
            engine,
            Arc::clone(&config),
            logger.clone(),
        ));

        let dispatcher: Arc<dyn ToolHandler> = Arc::new(ToolDispatcher::new(
            Arc::clone(&sessions),
            logger.clone(),
        ));

        let mut server = ToolServer::new(SERVER_NAME, SERVER_VERSION, logger.clone());
        for contract in contract_set() {
            server.register_tool(contract, Arc::clone(&dispatcher));
        }

        logger.debug(
            format!("Registered {} tools", server.tool_count()),
            Some("gateway"),
            None,
        );

        Self {
            config,
            sessions,
            server,
            logger,
        }
    }

    pub fn server(&self) -> &ToolServer {
        &self.server
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager<E> {
        &self.sessions
    }

    pub fn logger(&self) -> &GatewayLogger {
        &self.logger
    }

    /// Close the live session, if any. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        self.sessions.teardown().await;
    }
}
