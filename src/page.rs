//! The page tools operate on.
//!
//! [`StagehandPage`] wraps a chromiumoxide page with the pieces the model-backed
//! operations need: the LLM client, the DOM settle wait, and snapshotting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestServedFromCache,
    EventRequestWillBeSent, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page as ChromiumPage, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::dom_scripts::{DomSnapshot, SNAPSHOT_SCRIPT};
use crate::engine::{
    ActOptions, ActResult, AutomationPage, EngineError, ExtractOptions, ObserveOptions,
    ObserveResult, ScreenshotOptions,
};
use crate::llm::{LlmClient, LlmError, OpenAiChatProvider};
use crate::logging::GatewayLogger;
use crate::runtime::cdp_error;

mod actions;
mod inference;

const SETTLE_CATEGORY: &str = "dom-settle";
const QUIET_WINDOW: Duration = Duration::from_millis(500);
const STALL_THRESHOLD: Duration = Duration::from_secs(2);

pub struct StagehandPage {
    page: ChromiumPage,
    llm: Option<LlmClient<OpenAiChatProvider>>,
    logger: GatewayLogger,
    dom_settle_timeout: Duration,
}

impl StagehandPage {
    pub fn new(
        page: ChromiumPage,
        llm: Option<LlmClient<OpenAiChatProvider>>,
        logger: GatewayLogger,
        dom_settle_timeout: Duration,
    ) -> Self {
        Self {
            page,
            llm,
            logger,
            dom_settle_timeout,
        }
    }

    pub fn inner(&self) -> &ChromiumPage {
        &self.page
    }

    pub(crate) fn logger(&self) -> &GatewayLogger {
        &self.logger
    }

    pub(crate) fn llm(&self) -> Result<&LlmClient<OpenAiChatProvider>, EngineError> {
        self.llm
            .as_ref()
            .ok_or(EngineError::Llm(LlmError::MissingApiKey))
    }

    pub async fn evaluate_expression(&self, expression: &str) -> Result<JsonValue, EngineError> {
        let result = self.page.evaluate(expression).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    pub async fn snapshot(&self) -> Result<DomSnapshot, EngineError> {
        let value = self.evaluate_expression(SNAPSHOT_SCRIPT).await?;
        let snapshot: DomSnapshot = serde_json::from_value(value)?;
        self.logger.debug(
            "Captured DOM snapshot",
            Some("snapshot"),
            Some(json!({
                "url": snapshot.url,
                "elements": snapshot.elements.len(),
                "text_len": snapshot.text.len(),
            })),
        );
        Ok(snapshot)
    }

    /// Wait until the network has been quiet for a short window, or until the
    /// configured timeout elapses. Requests stuck longer than a couple of
    /// seconds are treated as finished.
    pub async fn wait_for_settled_dom(&self) -> Result<(), EngineError> {
        if let Err(err) = self.page.execute(network::EnableParams::default()).await {
            self.logger.debug(
                format!("Failed to enable Network domain before settle wait: {err}"),
                Some(SETTLE_CATEGORY),
                None,
            );
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listeners = vec![
            spawn_listener(
                self.page
                    .event_listener::<EventRequestWillBeSent>()
                    .await
                    .map_err(cdp_error)?,
                tx.clone(),
                |ev| {
                    if matches!(
                        ev.r#type,
                        Some(ResourceType::WebSocket | ResourceType::EventSource)
                    ) {
                        None
                    } else {
                        Some(NetworkEvent::Started(ev.request_id.as_ref().to_string()))
                    }
                },
            ),
            spawn_listener(
                self.page
                    .event_listener::<EventLoadingFinished>()
                    .await
                    .map_err(cdp_error)?,
                tx.clone(),
                |ev| Some(NetworkEvent::Finished(ev.request_id.as_ref().to_string())),
            ),
            spawn_listener(
                self.page
                    .event_listener::<EventLoadingFailed>()
                    .await
                    .map_err(cdp_error)?,
                tx.clone(),
                |ev| Some(NetworkEvent::Finished(ev.request_id.as_ref().to_string())),
            ),
            spawn_listener(
                self.page
                    .event_listener::<EventRequestServedFromCache>()
                    .await
                    .map_err(cdp_error)?,
                tx.clone(),
                |ev| Some(NetworkEvent::Finished(ev.request_id.as_ref().to_string())),
            ),
        ];
        drop(tx);

        let mut inflight = InflightRequests::default();
        let mut stall_tick = time::interval(QUIET_WINDOW);
        stall_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let quiet = time::sleep(QUIET_WINDOW);
        let deadline = time::sleep(self.dom_settle_timeout);
        tokio::pin!(quiet, deadline);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        inflight.apply(event, Instant::now());
                        quiet.as_mut().reset(time::Instant::now() + QUIET_WINDOW);
                    }
                    None => break,
                },
                _ = &mut quiet, if inflight.is_idle() => break,
                _ = stall_tick.tick() => {
                    let stalled = inflight.sweep(Instant::now(), STALL_THRESHOLD);
                    if stalled > 0 {
                        self.logger.debug(
                            format!("Forcing completion of {stalled} stalled requests"),
                            Some(SETTLE_CATEGORY),
                            None,
                        );
                        quiet.as_mut().reset(time::Instant::now() + QUIET_WINDOW);
                    }
                }
                _ = &mut deadline => {
                    if !inflight.is_idle() {
                        self.logger.debug(
                            format!("DOM settle timeout reached with {} inflight requests", inflight.len()),
                            Some(SETTLE_CATEGORY),
                            None,
                        );
                    }
                    break;
                }
            }
        }

        for handle in listeners {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationPage for StagehandPage {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.page.goto(url).await.map_err(cdp_error)?;
        if let Err(err) = self.page.wait_for_navigation().await {
            self.logger.debug(
                format!("Navigation wait failed: {err}"),
                Some("navigate"),
                None,
            );
        }
        self.wait_for_settled_dom().await
    }

    async fn act(&self, options: ActOptions) -> Result<ActResult, EngineError> {
        inference::act(self, options).await
    }

    async fn extract(&self, options: ExtractOptions) -> Result<JsonValue, EngineError> {
        inference::extract(self, options).await
    }

    async fn observe(&self, options: ObserveOptions) -> Result<Vec<ObserveResult>, EngineError> {
        inference::observe(self, options.instruction.as_deref(), false).await
    }

    async fn screenshot(&self, options: ScreenshotOptions) -> Result<Vec<u8>, EngineError> {
        let format = options
            .path
            .as_deref()
            .map(screenshot_format)
            .unwrap_or(CaptureScreenshotFormat::Png);

        let params = ScreenshotParams::builder()
            .format(format)
            .full_page(options.full_page)
            .build();
        let bytes = self.page.screenshot(params).await.map_err(cdp_error)?;

        if let Some(path) = options.path.as_deref() {
            let target = resolve_output_path(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &bytes).await?;
            self.logger.debug(
                format!("Screenshot written to {}", target.display()),
                Some("screenshot"),
                None,
            );
        }

        Ok(bytes)
    }
}

/// Image format implied by a file extension. Unknown extensions yield PNG.
pub fn screenshot_format(path: &Path) -> CaptureScreenshotFormat {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg" | "jpeg") => CaptureScreenshotFormat::Jpeg,
        Some("webp") => CaptureScreenshotFormat::Webp,
        _ => CaptureScreenshotFormat::Png,
    }
}

/// Resolve relative paths against the current working directory.
pub fn resolve_output_path(path: &Path) -> Result<PathBuf, EngineError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkEvent {
    Started(String),
    Finished(String),
}

#[derive(Debug, Default)]
struct InflightRequests {
    started: HashMap<String, Instant>,
}

impl InflightRequests {
    fn apply(&mut self, event: NetworkEvent, now: Instant) {
        match event {
            NetworkEvent::Started(id) => {
                self.started.insert(id, now);
            }
            NetworkEvent::Finished(id) => {
                self.started.remove(&id);
            }
        }
    }

    /// Drop requests older than `threshold`. Returns how many were dropped.
    fn sweep(&mut self, now: Instant, threshold: Duration) -> usize {
        let before = self.started.len();
        self.started
            .retain(|_, started| now.saturating_duration_since(*started) <= threshold);
        before - self.started.len()
    }

    fn is_idle(&self) -> bool {
        self.started.is_empty()
    }

    fn len(&self) -> usize {
        self.started.len()
    }
}

fn spawn_listener<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::UnboundedSender<NetworkEvent>,
    map: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Unpin + Send + Sync + 'static,
    F: Fn(&T) -> Option<NetworkEvent> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if let Some(mapped) = map(event.as_ref()) {
                if tx.send(mapped).is_err() {
                    break;
                }
            }
        }
    })
}
