//! The fixed set of tools exposed by the gateway.
//!
//! Each [`ToolContract`] pairs a tool's protocol metadata with the validator
//! used to check its arguments. The set is built once when the gateway is
//! constructed and never changes afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::schema::{Field, ValidationError, Validator};

/// Identifiers of the five supported tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolName {
    Navigate,
    Act,
    Extract,
    Observe,
    Screenshot,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::Navigate,
        ToolName::Act,
        ToolName::Extract,
        ToolName::Observe,
        ToolName::Screenshot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Navigate => "navigate",
            ToolName::Act => "act",
            ToolName::Extract => "extract",
            ToolName::Observe => "observe",
            ToolName::Screenshot => "screenshot",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == value)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static declaration of one tool: metadata plus its input validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContract {
    pub name: ToolName,
    pub title: &'static str,
    pub description: &'static str,
    pub input: Validator,
}

impl ToolContract {
    /// JSON Schema advertised to callers in `tools/list`.
    pub fn input_schema(&self) -> JsonValue {
        self.input.to_json_schema()
    }

    /// Validate raw arguments and decode them into the tool's typed input.
    pub fn decode<T: DeserializeOwned>(&self, arguments: &JsonValue) -> Result<T, ValidationError> {
        let checked = self.input.validate(arguments)?;
        serde_json::from_value(checked).map_err(|err| ValidationError::single("$", err.to_string()))
    }
}

const INSTRUCTION_DESCRIPTION: &str = "The instruction to execute";

pub fn navigate_contract() -> ToolContract {
    ToolContract {
        name: ToolName::Navigate,
        title: "Navigate",
        description: "Navigate to a specific URL using Stagehand",
        input: Validator::object(vec![
            Field::required("url", Validator::url("Must be a valid URL"))
                .describe("The URL to navigate to"),
        ]),
    }
}

pub fn act_contract() -> ToolContract {
    ToolContract {
        name: ToolName::Act,
        title: "Act",
        description: "Perform an action on the current page using natural language instructions",
        input: Validator::object(vec![
            Field::required(
                "instruction",
                Validator::non_empty_string("Instruction is required"),
            )
            .describe(INSTRUCTION_DESCRIPTION),
            Field::optional("variables", Validator::record(Validator::string())).describe(
                "Variables to be substituted in the instruction. Replaces \"%variable_name%\" in the instruction with the value of the variable.",
            ),
        ]),
    }
}

pub fn extract_contract() -> ToolContract {
    ToolContract {
        name: ToolName::Extract,
        title: "Extract",
        description: "Extract structured data from the current page. Optionally provide a JSON schema to structure the extraction.",
        input: Validator::object(vec![
            Field::optional(
                "instruction",
                Validator::non_empty_string("Instruction is required"),
            )
            .describe(INSTRUCTION_DESCRIPTION),
            Field::optional("schema", Validator::Any)
                .describe("JSON schema for the extracted data"),
        ]),
    }
}

pub fn observe_contract() -> ToolContract {
    ToolContract {
        name: ToolName::Observe,
        title: "Observe",
        description: "Get actionable elements from the current page",
        input: Validator::object(vec![
            Field::optional("instruction", Validator::string()).describe(INSTRUCTION_DESCRIPTION),
        ]),
    }
}

pub fn screenshot_contract() -> ToolContract {
    ToolContract {
        name: ToolName::Screenshot,
        title: "Screenshot",
        description: "Capture a screenshot of the current page",
        input: Validator::object(vec![
            Field::optional("fullPage", Validator::Boolean)
                .with_default(json!(true))
                .describe(
                    "When true, takes a screenshot of the full scrollable page, instead of the currently visible viewport. Defaults to true.",
                ),
            Field::optional("path", Validator::string()).describe(
                "The file path to save the image to. The screenshot type will be inferred from file extension. If path is a relative path, then it is resolved relative to the current working directory. If no path is provided, the image won't be saved to the disk.",
            ),
        ]),
    }
}

/// Build every contract, in registration order.
pub fn contract_set() -> Vec<ToolContract> {
    ToolName::ALL.into_iter().map(contract_for).collect()
}

pub fn contract_for(name: ToolName) -> ToolContract {
    match name {
        ToolName::Navigate => navigate_contract(),
        ToolName::Act => act_contract(),
        ToolName::Extract => extract_contract(),
        ToolName::Observe => observe_contract(),
        ToolName::Screenshot => screenshot_contract(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NavigateInput {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActInput {
    pub instruction: String,
    #[serde(default)]
    pub variables: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractInput {
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub schema: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserveInput {
    #[serde(default)]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScreenshotInput {
    #[serde(rename = "fullPage", default = "default_full_page")]
    pub full_page: bool,
    #[serde(default)]
    pub path: Option<String>,
}

fn default_full_page() -> bool {
    true
}
