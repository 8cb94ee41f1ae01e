//! Chromiumoxide-backed automation engine.
//!
//! [`ChromiumoxideEngine`] starts a [`ChromiumSession`] by attaching to or
//! launching a browser according to the [`LaunchPlan`], pumps the CDP handler
//! on a spawned task, and exposes a single [`StagehandPage`].

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::Page as ChromiumPage;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::browser::{LaunchPlan, LaunchStrategy};
use crate::config::GatewayConfig;
use crate::engine::{AutomationEngine, AutomationSession, EngineError};
use crate::llm::LlmClient;
use crate::logging::GatewayLogger;
use crate::page::StagehandPage;

const CATEGORY: &str = "browser";
const BLANK_PAGE: &str = "about:blank";

/// Engine that drives Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumoxideEngine {
    logger: GatewayLogger,
}

impl ChromiumoxideEngine {
    pub fn new(logger: GatewayLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AutomationEngine for ChromiumoxideEngine {
    type Session = ChromiumSession;

    async fn start(&self, config: &GatewayConfig) -> Result<ChromiumSession, EngineError> {
        let plan = LaunchPlan::from_config(config);
        self.logger.info(
            format!("Starting browser: {}", plan.describe()),
            Some(CATEGORY),
            None,
        );

        let (browser, handler) = match &plan.strategy {
            LaunchStrategy::AttachCdp { url } => Browser::connect(url.as_str())
                .await
                .map_err(startup_error)?,
            LaunchStrategy::Launch { .. } => Browser::launch(build_config(&plan)?)
                .await
                .map_err(startup_error)?,
        };
        let handler = spawn_handler(handler, self.logger.clone());

        let page = match open_page(&browser).await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(err);
            }
        };

        let llm = match LlmClient::from_config(config, self.logger.clone()) {
            Ok(client) => Some(client),
            Err(err) => {
                self.logger.info(
                    format!("Model-backed tools unavailable: {err}"),
                    Some(CATEGORY),
                    None,
                );
                None
            }
        };

        let page = StagehandPage::new(
            page,
            llm,
            self.logger.clone(),
            Duration::from_millis(config.dom_settle_timeout_ms),
        );

        self.logger.debug(
            "Browser ready",
            Some(CATEGORY),
            Some(json!({ "attached": plan.is_attach() })),
        );

        Ok(ChromiumSession {
            browser: Mutex::new(browser),
            handler,
            page,
            attached: plan.is_attach(),
            logger: self.logger.clone(),
        })
    }
}

/// A running browser plus the page the tools operate on.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    page: StagehandPage,
    attached: bool,
    logger: GatewayLogger,
}

#[async_trait]
impl AutomationSession for ChromiumSession {
    type Page = StagehandPage;

    fn page(&self) -> Option<&StagehandPage> {
        Some(&self.page)
    }

    /// Launched browsers are closed; attached ones are only disconnected.
    async fn close(self) -> Result<(), EngineError> {
        let mut browser = self.browser.into_inner();

        let result = if self.attached {
            Ok(())
        } else {
            let closed = browser.close().await.map(|_| ()).map_err(cdp_error);
            if let Err(err) = browser.wait().await {
                self.logger.debug(
                    format!("Failed to reap browser process: {err}"),
                    Some(CATEGORY),
                    None,
                );
            }
            closed
        };

        self.handler.abort();
        result
    }
}

pub(crate) fn build_config(plan: &LaunchPlan) -> Result<BrowserConfig, EngineError> {
    let viewport = chromiumoxide::handler::viewport::Viewport {
        width: plan.viewport.width,
        height: plan.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: plan.viewport.is_landscape(),
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder()
        .viewport(viewport)
        .window_size(plan.viewport.width, plan.viewport.height)
        .args(plan.args.clone());

    if let LaunchStrategy::Launch {
        executable,
        headless,
    } = &plan.strategy
    {
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        if !*headless {
            builder = builder.with_head();
        }
    }

    builder.build().map_err(EngineError::Startup)
}

async fn open_page(browser: &Browser) -> Result<ChromiumPage, EngineError> {
    let existing = browser.pages().await.map_err(startup_error)?;
    match existing.into_iter().next() {
        Some(page) => Ok(page),
        None => browser.new_page(BLANK_PAGE).await.map_err(startup_error),
    }
}

fn spawn_handler(mut handler: Handler, logger: GatewayLogger) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                logger.debug(format!("CDP handler error: {err}"), Some(CATEGORY), None);
            }
        }
    })
}

fn startup_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Startup(err.to_string())
}

pub(crate) fn cdp_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Operation(err.to_string())
}
