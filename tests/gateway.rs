use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use stagehand_mcp::config::GatewayConfig;
use stagehand_mcp::engine::{
    ActOptions, ActResult, AutomationEngine, AutomationPage, AutomationSession, EngineError,
    ExtractOptions, ObserveOptions, ObserveResult, ScreenshotOptions,
};
use stagehand_mcp::gateway::StagehandGateway;
use stagehand_mcp::server::{CallToolResult, ContentItem};
use stagehand_mcp::transport::handle_line;
use stagehand_mcp::{GatewayConfigOverrides, GatewayError};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Start,
    Goto(String),
    Extract(Option<String>),
    Screenshot(ScreenshotOptions),
    Close,
}

#[derive(Clone, Default)]
struct StubEngine {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_start: bool,
}

impl StubEngine {
    fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn starts(&self) -> usize {
        self.calls().iter().filter(|call| **call == Call::Start).count()
    }
}

struct StubSession {
    page: StubPage,
}

struct StubPage {
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl AutomationEngine for StubEngine {
    type Session = StubSession;

    async fn start(&self, _config: &GatewayConfig) -> Result<StubSession, EngineError> {
        if self.fail_start {
            return Err(EngineError::Startup("browser executable not found".into()));
        }
        self.calls.lock().unwrap().push(Call::Start);
        Ok(StubSession {
            page: StubPage {
                calls: Arc::clone(&self.calls),
            },
        })
    }
}

#[async_trait]
impl AutomationSession for StubSession {
    type Page = StubPage;

    fn page(&self) -> Option<&StubPage> {
        Some(&self.page)
    }

    async fn close(self) -> Result<(), EngineError> {
        self.page.calls.lock().unwrap().push(Call::Close);
        Ok(())
    }
}

#[async_trait]
impl AutomationPage for StubPage {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Goto(url.to_string()));
        Ok(())
    }

    async fn act(&self, options: ActOptions) -> Result<ActResult, EngineError> {
        Ok(ActResult {
            success: true,
            message: "Action [click] performed successfully".into(),
            action: options.action,
        })
    }

    async fn extract(&self, options: ExtractOptions) -> Result<JsonValue, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Extract(options.instruction));
        Ok(json!({ "title": "Example" }))
    }

    async fn observe(&self, _options: ObserveOptions) -> Result<Vec<ObserveResult>, EngineError> {
        Ok(Vec::new())
    }

    async fn screenshot(&self, options: ScreenshotOptions) -> Result<Vec<u8>, EngineError> {
        self.calls.lock().unwrap().push(Call::Screenshot(options));
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

fn gateway(engine: StubEngine) -> StagehandGateway<StubEngine> {
    StagehandGateway::new(
        GatewayConfigOverrides::default().model_api_key("sk-test"),
        engine,
    )
}

fn single_text(result: &CallToolResult) -> &str {
    assert_eq!(result.content.len(), 1, "expected one content item");
    match &result.content[0] {
        ContentItem::Text { text } => text,
        other => panic!("expected text content, got {other:?}"),
    }
}

#[tokio::test]
async fn navigate_starts_one_session_and_reports_the_url() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());
    assert!(engine.calls().is_empty());

    let result = gateway
        .server()
        .call_tool("navigate", Some(json!({ "url": "https://example.com" })))
        .await
        .unwrap();

    assert!(single_text(&result).contains("https://example.com"));
    assert!(!result.is_error);
    assert_eq!(
        engine.calls(),
        vec![Call::Start, Call::Goto("https://example.com".into())]
    );

    gateway
        .server()
        .call_tool("navigate", Some(json!({ "url": "https://example.org" })))
        .await
        .unwrap();
    assert_eq!(engine.starts(), 1);
    assert_eq!(gateway.sessions().sessions_started(), 1);
}

#[tokio::test]
async fn extract_with_schema_wraps_data_in_success_envelope() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());

    let result = gateway
        .server()
        .call_tool(
            "extract",
            Some(json!({
                "schema": {
                    "type": "object",
                    "properties": { "title": { "type": "string" } }
                }
            })),
        )
        .await
        .unwrap();

    let payload: JsonValue = serde_json::from_str(single_text(&result)).unwrap();
    assert_eq!(
        payload,
        json!({
            "success": true,
            "message": "Data extracted successfully",
            "data": { "title": "Example" }
        })
    );
    assert_eq!(engine.calls()[1], Call::Extract(None));
}

#[tokio::test]
async fn screenshot_returns_image_or_saved_path() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());

    let inline = gateway
        .server()
        .call_tool("screenshot", Some(json!({ "fullPage": true })))
        .await
        .unwrap();
    assert_eq!(inline.content.len(), 1);
    match &inline.content[0] {
        ContentItem::Image { data, mime_type } => {
            assert_eq!(mime_type, "image/png");
            assert!(!data.is_empty());
        }
        other => panic!("expected image content, got {other:?}"),
    }

    let saved = gateway
        .server()
        .call_tool(
            "screenshot",
            Some(json!({ "fullPage": true, "path": "out.png" })),
        )
        .await
        .unwrap();
    assert!(single_text(&saved).contains("out.png"));

    let calls = engine.calls();
    assert_eq!(
        calls[2],
        Call::Screenshot(ScreenshotOptions {
            full_page: true,
            path: Some(PathBuf::from("out.png")),
        })
    );
}

#[tokio::test]
async fn malformed_arguments_never_touch_the_engine() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());

    for (tool, arguments) in [
        ("navigate", json!({})),
        ("navigate", json!({ "url": "example" })),
        ("act", json!({ "action": 42 })),
        ("extract", json!({ "instruction": ["not", "a", "string"] })),
        ("screenshot", json!({ "fullPage": "yes" })),
    ] {
        let err = gateway
            .server()
            .call_tool(tool, Some(arguments))
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::Validation(_)),
            "{tool}: expected validation error, got {err}"
        );
    }

    assert!(engine.calls().is_empty());
    assert!(!gateway.sessions().is_live().await);
}

#[tokio::test]
async fn startup_failure_is_a_tool_error_and_is_retried() {
    let engine = StubEngine::failing();
    let gateway = gateway(engine.clone());

    let response = handle_line(
        gateway.server(),
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"navigate","arguments":{"url":"https://example.com"}}}"#,
    )
    .await
    .unwrap();

    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], json!(true));
    assert_eq!(
        result["content"][0]["text"],
        "failed to initialise Stagehand: browser executable not found"
    );
    assert!(!gateway.sessions().is_live().await);
}

#[tokio::test]
async fn cleanup_closes_the_session_and_next_call_restarts() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());

    gateway.cleanup().await;
    assert!(engine.calls().is_empty());

    gateway
        .server()
        .call_tool("navigate", Some(json!({ "url": "https://example.com" })))
        .await
        .unwrap();
    gateway.cleanup().await;
    gateway.cleanup().await;
    assert!(!gateway.sessions().is_live().await);

    gateway
        .server()
        .call_tool("observe", None)
        .await
        .unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Start,
            Call::Goto("https://example.com".into()),
            Call::Close,
            Call::Start,
        ]
    );
    assert_eq!(gateway.sessions().sessions_started(), 2);
}

#[tokio::test]
async fn tools_list_describes_the_five_tools() {
    let gateway = gateway(StubEngine::default());

    let response = handle_line(
        gateway.server(),
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
    )
    .await
    .unwrap();

    let tools = response.result.unwrap()["tools"].clone();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["navigate", "act", "extract", "observe", "screenshot"]);
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["url"]));
}

#[tokio::test]
async fn unknown_tool_is_a_protocol_error() {
    let engine = StubEngine::default();
    let gateway = gateway(engine.clone());

    let response = handle_line(
        gateway.server(),
        r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"teleport","arguments":{}}}"#,
    )
    .await
    .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32602);
    assert!(error.message.contains("teleport"));
    assert!(engine.calls().is_empty());
}
