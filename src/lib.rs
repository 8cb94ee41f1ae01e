//! MCP tool gateway for Stagehand-style browser automation.
//!
//! The gateway exposes five tools (`navigate`, `act`, `extract`, `observe`,
//! `screenshot`) over JSON-RPC on stdio. Requests are validated against each
//! tool's contract, then dispatched to a single lazily started automation
//! session.
//!
//! ```no_run
//! use stagehand_mcp::config::GatewayConfigOverrides;
//! use stagehand_mcp::gateway::StagehandGateway;
//! use stagehand_mcp::runtime::ChromiumoxideEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = StagehandGateway::new(
//!     GatewayConfigOverrides::default().headless(true),
//!     ChromiumoxideEngine::default(),
//! );
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! stagehand_mcp::transport::serve(gateway.server(), stdin, tokio::io::stdout()).await?;
//! gateway.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod contracts;
pub mod dispatch;
pub mod dom_scripts;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod logging;
pub mod page;
pub mod runtime;
pub mod schema;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{GatewayConfig, GatewayConfigOverrides};
pub use error::GatewayError;
pub use gateway::StagehandGateway;
pub use server::{CallToolResult, ToolServer};
