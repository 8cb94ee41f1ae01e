//! Stagehand MCP server.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout. Logs go to stderr so they
//! never interleave with protocol frames.
//!
//! Usage examples:
//!   Local Chromium:
//!     $ OPENAI_API_KEY=... stagehand-mcp --headless
//!   Existing browser:
//!     $ stagehand-mcp --cdp-url ws://127.0.0.1:9222/devtools/browser/<id>

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use stagehand_mcp::config::{GatewayConfig, GatewayConfigOverrides, Verbosity};
use stagehand_mcp::gateway::StagehandGateway;
use stagehand_mcp::logging::GatewayLogger;
use stagehand_mcp::runtime::ChromiumoxideEngine;
use stagehand_mcp::transport;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(
    name = "stagehand-mcp",
    author,
    version,
    about = "MCP server exposing Stagehand browser automation tools"
)]
struct Cli {
    /// Model used for act, extract, and observe.
    #[arg(long, alias = "modelName")]
    model_name: Option<String>,

    /// API key for the model provider. Falls back to MODEL_API_KEY / OPENAI_API_KEY.
    #[arg(long, alias = "modelApiKey")]
    model_api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long, alias = "modelBaseUrl")]
    model_base_url: Option<String>,

    /// Chromium executable to launch.
    #[arg(long, alias = "executablePath")]
    executable_path: Option<String>,

    /// Launch the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Attach to a running browser instead of launching one.
    #[arg(long, alias = "cdpUrl")]
    cdp_url: Option<String>,

    /// Milliseconds to wait for network quiet after page changes.
    #[arg(long, alias = "domSettleTimeoutMs")]
    dom_settle_timeout_ms: Option<u64>,

    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(self) -> GatewayConfigOverrides {
        let verbose = (self.verbose > 0).then(|| Verbosity::from_flag_count(self.verbose));
        GatewayConfigOverrides {
            model_name: self.model_name,
            model_api_key: self.model_api_key,
            model_base_url: self.model_base_url,
            executable_path: self.executable_path,
            headless: self.headless.then_some(true),
            cdp_url: self.cdp_url,
            verbose,
            dom_settle_timeout_ms: self.dom_settle_timeout_ms,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_env_logger(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = GatewayConfig::from_env()
        .context("failed to read configuration from environment")?
        .with_overrides(cli.overrides());
    info!("Starting {} with {config:?}", stagehand_mcp::gateway::SERVER_NAME);

    let logger = GatewayLogger::new(config.verbose);
    let engine = ChromiumoxideEngine::new(logger.clone());
    let gateway = StagehandGateway::with_logger(config, engine, logger);

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let outcome = tokio::select! {
        result = transport::serve(gateway.server(), stdin, stdout) => {
            result.context("transport failed")
        }
        signal = shutdown_signal() => {
            info!("Received {signal}, shutting down");
            Ok(())
        }
    };

    gateway.cleanup().await;
    outcome
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}

fn init_env_logger(verbose: u8) {
    if env::var("RUST_LOG").is_err() {
        let level = if verbose > 0 { "debug" } else { "info" };
        unsafe {
            env::set_var("RUST_LOG", level);
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .try_init();
}
