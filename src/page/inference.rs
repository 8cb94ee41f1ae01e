//! Model-backed observe, act, and extract.

use async_openai::types::{ResponseFormat, ResponseFormatJsonSchema};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::dom_scripts::{DomSnapshot, PAGE_TEXT_SCRIPT};
use crate::engine::{ActOptions, ActResult, EngineError, ExtractOptions, ObserveResult};
use crate::llm::prompts::{
    build_act_observe_prompt, build_extract_system_prompt, build_extract_user_prompt,
    build_observe_system_prompt, build_observe_user_message, effective_extract_instruction,
    effective_observe_instruction,
};
use crate::llm::{ChatCompletionProvider, LlmClient};
use crate::schema::Validator;

use super::StagehandPage;
use super::actions;

const SCHEMA_NAME: &str = "extraction_schema";

pub(crate) async fn observe(
    page: &StagehandPage,
    instruction: Option<&str>,
    from_act: bool,
) -> Result<Vec<ObserveResult>, EngineError> {
    let llm = page.llm()?;
    page.wait_for_settled_dom().await?;
    let snapshot = page.snapshot().await?;
    let function_name = if from_act { "act" } else { "observe" };

    let results = request_observation(llm, instruction, &snapshot, function_name).await?;
    page.logger().debug(
        format!("Found {} observe results", results.len()),
        Some(function_name),
        Some(json!({ "url": snapshot.url })),
    );
    Ok(results)
}

pub(crate) async fn act(page: &StagehandPage, options: ActOptions) -> Result<ActResult, EngineError> {
    let prompt = build_act_observe_prompt(&options.action, options.variables.as_ref());
    let observed = observe(page, Some(&prompt), true).await?;

    let Some(mut target) = observed.into_iter().next() else {
        page.logger().info(
            format!("No element found for action: {}", options.action),
            Some("act"),
            None,
        );
        return Ok(ActResult {
            success: false,
            message: "No observe results found for action".to_string(),
            action: options.action,
        });
    };

    if let (Some(args), Some(vars)) = (target.arguments.as_mut(), options.variables.as_ref()) {
        *args = actions::substitute_variables(args, vars);
    }

    actions::perform(page, &target).await?;
    page.wait_for_settled_dom().await?;

    Ok(act_success(&target))
}

pub(crate) async fn extract(
    page: &StagehandPage,
    options: ExtractOptions,
) -> Result<JsonValue, EngineError> {
    if options.instruction.is_none() && options.schema.is_none() {
        let text = page.evaluate_expression(PAGE_TEXT_SCRIPT).await?;
        return Ok(json!({
            "page_text": text.as_str().unwrap_or_default()
        }));
    }

    let llm = page.llm()?;
    page.wait_for_settled_dom().await?;
    let snapshot = page.snapshot().await?;
    request_extraction(llm, &options, &snapshot).await
}

/// Ask the model which snapshot elements match `instruction`.
pub(crate) async fn request_observation<P: ChatCompletionProvider>(
    llm: &LlmClient<P>,
    instruction: Option<&str>,
    snapshot: &DomSnapshot,
    function_name: &str,
) -> Result<Vec<ObserveResult>, EngineError> {
    let instruction = effective_observe_instruction(instruction);
    let reply = llm
        .complete_json(
            build_observe_system_prompt(),
            build_observe_user_message(instruction, &snapshot.element_listing()),
            ResponseFormat::JsonObject,
            function_name,
        )
        .await?;
    parse_observe_reply(&reply, snapshot)
}

pub(crate) async fn request_extraction<P: ChatCompletionProvider>(
    llm: &LlmClient<P>,
    options: &ExtractOptions,
    snapshot: &DomSnapshot,
) -> Result<JsonValue, EngineError> {
    let instruction = effective_extract_instruction(options.instruction.as_deref());
    let user_prompt = build_extract_user_prompt(instruction, snapshot.clipped_text());

    match &options.schema {
        Some(validator) => {
            let reply = llm
                .complete_json(
                    build_extract_system_prompt(true),
                    user_prompt,
                    structured_format(validator),
                    "extract",
                )
                .await?;
            check_extraction(validator, reply)
        }
        None => {
            let reply = llm
                .complete_json(
                    build_extract_system_prompt(false),
                    user_prompt,
                    ResponseFormat::JsonObject,
                    "extract",
                )
                .await?;
            Ok(json!({ "extraction": extraction_text(reply) }))
        }
    }
}

fn structured_format(validator: &Validator) -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: SCHEMA_NAME.to_string(),
            schema: Some(validator.to_json_schema()),
            strict: Some(false),
        },
    }
}

/// Validate a structured reply. Models sometimes wrap the payload in `data`.
fn check_extraction(validator: &Validator, reply: JsonValue) -> Result<JsonValue, EngineError> {
    match validator.validate(&reply) {
        Ok(decoded) => Ok(decoded),
        Err(err) => reply
            .get("data")
            .and_then(|inner| validator.validate(inner).ok())
            .ok_or_else(|| {
                EngineError::operation(format!("extracted data does not match schema: {err}"))
            }),
    }
}

fn extraction_text(reply: JsonValue) -> String {
    match reply {
        JsonValue::Object(mut map) => match map.remove("extraction") {
            Some(JsonValue::String(text)) => text,
            Some(JsonValue::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        JsonValue::String(text) => text,
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ObservedElement {
    element_id: JsonValue,
    #[serde(default)]
    description: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<JsonValue>>,
}

/// Map the model's element ids back to snapshot xpaths. Unknown ids are
/// dropped.
pub(crate) fn parse_observe_reply(
    reply: &JsonValue,
    snapshot: &DomSnapshot,
) -> Result<Vec<ObserveResult>, EngineError> {
    let items = match reply {
        JsonValue::Array(items) => items.clone(),
        JsonValue::Object(map) => match map.get("elements") {
            Some(JsonValue::Array(items)) => items.clone(),
            Some(JsonValue::Null) | None => Vec::new(),
            Some(_) => return Err(EngineError::operation("observe reply `elements` is not an array")),
        },
        _ => return Err(EngineError::operation("observe reply is not a JSON object")),
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let element: ObservedElement = serde_json::from_value(item)?;
        let Some(id) = element_id(&element.element_id) else {
            continue;
        };
        let Some(found) = snapshot.element(id) else {
            continue;
        };

        results.push(ObserveResult {
            selector: format!("xpath={}", found.xpath),
            description: element.description,
            backend_node_id: None,
            method: element.method.filter(|method| !method.trim().is_empty()),
            arguments: element.arguments.map(|args| {
                args.into_iter()
                    .map(|arg| match arg {
                        JsonValue::String(text) => text,
                        other => other.to_string(),
                    })
                    .collect()
            }),
        });
    }
    Ok(results)
}

fn element_id(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(number) => number.as_i64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn act_success(target: &ObserveResult) -> ActResult {
    let method = target.method.as_deref().unwrap_or("click");
    ActResult {
        success: true,
        message: format!(
            "Action [{method}] performed successfully on selector: {}",
            target.selector
        ),
        action: target.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::tests::RecordingProvider;
    use crate::schema::{Field, translate_value};

    fn snapshot() -> DomSnapshot {
        serde_json::from_value(json!({
            "url": "https://example.com/",
            "title": "Example Domain",
            "elements": [
                { "id": 1, "tag": "a", "role": "link", "text": "More information...",
                  "xpath": "/html[1]/body[1]/div[1]/p[2]/a[1]" },
                { "id": 2, "tag": "input", "role": "textbox", "text": "Search",
                  "xpath": "/html[1]/body[1]/form[1]/input[1]" }
            ],
            "text": "Example Domain\nThis domain is for use in illustrative examples."
        }))
        .unwrap()
    }

    #[test]
    fn observe_reply_maps_ids_to_xpaths() {
        let reply = json!({
            "elements": [
                { "element_id": 2, "description": "Search box", "method": "fill",
                  "arguments": ["%query%"] },
                { "element_id": "1", "description": "Info link", "method": "click",
                  "arguments": [] },
                { "element_id": 99, "description": "Ghost" }
            ]
        });

        let results = parse_observe_reply(&reply, &snapshot()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].selector, "xpath=/html[1]/body[1]/form[1]/input[1]");
        assert_eq!(results[0].arguments.as_deref(), Some(&["%query%".to_string()][..]));
        assert_eq!(results[1].selector, "xpath=/html[1]/body[1]/div[1]/p[2]/a[1]");
        assert_eq!(results[1].method.as_deref(), Some("click"));
    }

    #[test]
    fn observe_reply_accepts_bare_arrays_and_rejects_scalars() {
        let results =
            parse_observe_reply(&json!([{ "element_id": 1, "description": "Info" }]), &snapshot())
                .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].method.is_none());

        assert!(parse_observe_reply(&json!({}), &snapshot()).unwrap().is_empty());
        assert!(parse_observe_reply(&json!("nope"), &snapshot()).is_err());
    }

    #[test]
    fn structured_reply_falls_back_to_data_wrapper() {
        let validator = Validator::object(vec![Field::required("title", Validator::string())]);

        assert_eq!(
            check_extraction(&validator, json!({ "data": { "title": "Example" } })).unwrap(),
            json!({ "title": "Example" })
        );

        let err = check_extraction(&validator, json!({ "title": 3 })).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("extracted data does not match schema:")
        );
    }

    #[test]
    fn act_success_names_method_and_selector() {
        let result = act_success(&ObserveResult {
            selector: "xpath=/html[1]/body[1]/button[1]".into(),
            description: "Submit button".into(),
            backend_node_id: None,
            method: None,
            arguments: None,
        });
        assert!(result.success);
        assert_eq!(
            result.message,
            "Action [click] performed successfully on selector: xpath=/html[1]/body[1]/button[1]"
        );
        assert_eq!(result.action, "Submit button");
    }

    #[tokio::test]
    async fn observation_sends_element_listing() {
        let llm = LlmClient::new(
            "gpt-4.1-mini",
            RecordingProvider::replying(&[
                r#"{"elements":[{"element_id":1,"description":"Info link","method":"click","arguments":[]}]}"#,
            ]),
        );

        let results = request_observation(&llm, Some("find the info link"), &snapshot(), "observe")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let requests = llm.provider().requests.lock().await;
        let body = serde_json::to_string(&requests[0]).unwrap();
        assert!(body.contains("instruction: find the info link"));
        assert!(body.contains("[1] link <a>: More information..."));
        assert!(body.contains(r#""type":"json_object""#));
    }

    #[tokio::test]
    async fn extraction_without_schema_returns_extraction_string() {
        let llm = LlmClient::new(
            "gpt-4.1-mini",
            RecordingProvider::replying(&[r#"{"extraction":"Example Domain"}"#]),
        );
        let options = ExtractOptions {
            instruction: Some("get the heading".into()),
            schema: None,
        };

        let value = request_extraction(&llm, &options, &snapshot()).await.unwrap();
        assert_eq!(value, json!({ "extraction": "Example Domain" }));
    }

    #[tokio::test]
    async fn extraction_with_schema_sends_json_schema_format() {
        let llm = LlmClient::new(
            "gpt-4.1-mini",
            RecordingProvider::replying(&["```json\n{\"title\":\"Example Domain\"}\n```"]),
        );
        let options = ExtractOptions {
            instruction: None,
            schema: Some(translate_value(&json!({
                "type": "object",
                "properties": { "title": { "type": "string" } }
            }))),
        };

        let value = request_extraction(&llm, &options, &snapshot()).await.unwrap();
        assert_eq!(value, json!({ "title": "Example Domain" }));

        let requests = llm.provider().requests.lock().await;
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], SCHEMA_NAME);
        assert!(
            body.to_string()
                .contains("Extract all of the data on the page")
        );
    }
}
