//! Schema translation for caller-supplied extraction shapes.
//!
//! Callers describe the data they want back with a loosely-typed,
//! JSON-Schema-like document. This module turns that document into a
//! [`SchemaNode`] tree and compiles the tree into a [`Validator`] that can
//! check (and decode) candidate values. Translation is total: malformed or
//! unrecognised input never fails, it only loosens the resulting validator
//! towards [`Validator::Any`].

use std::fmt;

use serde_json::{Map as JsonMap, Value as JsonValue, json};
use thiserror::Error;

type JsonObject = JsonMap<String, JsonValue>;

/// Nodes nested deeper than this degrade to [`SchemaNode::Unknown`].
pub const MAX_SCHEMA_DEPTH: usize = 128;

/// Recursive description of an expected value's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String,
    Number,
    Boolean,
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Object {
        /// `None` when the document declared no usable `properties` map.
        properties: Option<Vec<(String, SchemaNode)>>,
        required: Vec<String>,
    },
    Unknown,
}

impl SchemaNode {
    /// Parse a JSON document into a schema tree. Never fails.
    pub fn parse(value: &JsonValue) -> SchemaNode {
        parse_node(value, 0)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SchemaNode::String => "string",
            SchemaNode::Number => "number",
            SchemaNode::Boolean => "boolean",
            SchemaNode::Array { .. } => "array",
            SchemaNode::Object { .. } => "object",
            SchemaNode::Unknown => "unknown",
        }
    }
}

fn parse_node(value: &JsonValue, depth: usize) -> SchemaNode {
    if depth >= MAX_SCHEMA_DEPTH {
        return SchemaNode::Unknown;
    }

    let Some(map) = value.as_object() else {
        return SchemaNode::Unknown;
    };

    match map.get("type").and_then(JsonValue::as_str) {
        Some("string") => SchemaNode::String,
        Some("number") => SchemaNode::Number,
        Some("boolean") => SchemaNode::Boolean,
        Some("array") => SchemaNode::Array {
            items: map
                .get("items")
                .filter(|items| items.is_object())
                .map(|items| Box::new(parse_node(items, depth + 1))),
        },
        Some("object") => SchemaNode::Object {
            properties: map
                .get("properties")
                .and_then(JsonValue::as_object)
                .map(|props| parse_properties(props, depth + 1)),
            required: map
                .get("required")
                .and_then(JsonValue::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        },
        _ => SchemaNode::Unknown,
    }
}

fn parse_properties(props: &JsonObject, depth: usize) -> Vec<(String, SchemaNode)> {
    props
        .iter()
        .map(|(name, node)| (name.clone(), parse_node(node, depth)))
        .collect()
}

/// Translate a schema tree into a validator.
///
/// A root that is not an object description with a property map yields the
/// permissive [`Validator::Any`].
pub fn translate(node: &SchemaNode) -> Validator {
    match node {
        SchemaNode::Object {
            properties: Some(_),
            ..
        } => compile(node),
        _ => Validator::Any,
    }
}

/// Parse and translate a raw JSON document in one step.
pub fn translate_value(value: &JsonValue) -> Validator {
    translate(&SchemaNode::parse(value))
}

fn compile(node: &SchemaNode) -> Validator {
    match node {
        SchemaNode::String => Validator::string(),
        SchemaNode::Number => Validator::Number,
        SchemaNode::Boolean => Validator::Boolean,
        SchemaNode::Array { items } => Validator::Array(Box::new(
            items.as_deref().map(compile).unwrap_or(Validator::Any),
        )),
        SchemaNode::Object {
            properties: Some(properties),
            required,
        } => Validator::Object(ObjectShape::new(
            properties
                .iter()
                .map(|(name, child)| Field {
                    name: name.clone(),
                    validator: compile(child),
                    required: required.iter().any(|req| req == name),
                    default: None,
                    description: None,
                })
                .collect(),
        )),
        // An object without declared properties accepts any map unchanged.
        SchemaNode::Object {
            properties: None, ..
        } => Validator::Record(Box::new(Validator::Any)),
        SchemaNode::Unknown => Validator::Any,
    }
}

/// Named string formats understood by [`StringRules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Url,
}

/// Extra constraints applied to string values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringRules {
    pub min_len: Option<usize>,
    pub format: Option<StringFormat>,
    /// Overrides the default message when a rule (not the type check) fails.
    pub message: Option<String>,
}

/// One declared key of an object validator.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub validator: Validator,
    pub required: bool,
    pub default: Option<JsonValue>,
    pub description: Option<String>,
}

impl Field {
    pub fn required(name: impl Into<String>, validator: Validator) -> Self {
        Self {
            name: name.into(),
            validator,
            required: true,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, validator: Validator) -> Self {
        Self {
            required: false,
            ..Self::required(name, validator)
        }
    }

    /// Value inserted when the key is missing from the input.
    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered set of declared object keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    fields: Vec<Field>,
}

impl ObjectShape {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Runtime checker/decoder compiled from a [`SchemaNode`] or declared directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// Accepts any value unchanged.
    Any,
    String(StringRules),
    Number,
    Boolean,
    Array(Box<Validator>),
    /// String-keyed map whose values all satisfy the inner validator.
    Record(Box<Validator>),
    Object(ObjectShape),
}

impl Validator {
    pub fn string() -> Self {
        Validator::String(StringRules::default())
    }

    pub fn url(message: impl Into<String>) -> Self {
        Validator::String(StringRules {
            format: Some(StringFormat::Url),
            message: Some(message.into()),
            ..StringRules::default()
        })
    }

    pub fn non_empty_string(message: impl Into<String>) -> Self {
        Validator::String(StringRules {
            min_len: Some(1),
            message: Some(message.into()),
            ..StringRules::default()
        })
    }

    pub fn array(items: Validator) -> Self {
        Validator::Array(Box::new(items))
    }

    pub fn record(values: Validator) -> Self {
        Validator::Record(Box::new(values))
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Validator::Object(ObjectShape::new(fields))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Validator::Any)
    }

    /// Check `value`, returning the decoded value or every issue found.
    pub fn validate(&self, value: &JsonValue) -> Result<JsonValue, ValidationError> {
        let mut issues = Vec::new();
        let decoded = self.check(value, &mut IssuePath::root(), &mut issues);
        if issues.is_empty() {
            Ok(decoded)
        } else {
            Err(ValidationError { issues })
        }
    }

    fn check(
        &self,
        value: &JsonValue,
        path: &mut IssuePath,
        issues: &mut Vec<ValidationIssue>,
    ) -> JsonValue {
        match self {
            Validator::Any => value.clone(),
            Validator::String(rules) => match value.as_str() {
                Some(text) => {
                    check_string_rules(text, rules, path, issues);
                    value.clone()
                }
                None => {
                    issues.push(path.issue(type_mismatch("string", value)));
                    JsonValue::Null
                }
            },
            Validator::Number => {
                if !value.is_number() {
                    issues.push(path.issue(type_mismatch("number", value)));
                }
                value.clone()
            }
            Validator::Boolean => {
                if !value.is_boolean() {
                    issues.push(path.issue(type_mismatch("boolean", value)));
                }
                value.clone()
            }
            Validator::Array(items) => match value.as_array() {
                Some(values) => JsonValue::Array(
                    values
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            path.push_index(index);
                            let decoded = items.check(item, path, issues);
                            path.pop();
                            decoded
                        })
                        .collect(),
                ),
                None => {
                    issues.push(path.issue(type_mismatch("array", value)));
                    JsonValue::Null
                }
            },
            Validator::Record(values) => match value.as_object() {
                Some(map) => JsonValue::Object(
                    map.iter()
                        .map(|(key, item)| {
                            path.push_key(key);
                            let decoded = values.check(item, path, issues);
                            path.pop();
                            (key.clone(), decoded)
                        })
                        .collect(),
                ),
                None => {
                    issues.push(path.issue(type_mismatch("object", value)));
                    JsonValue::Null
                }
            },
            Validator::Object(shape) => match value.as_object() {
                Some(map) => JsonValue::Object(check_object(shape, map, path, issues)),
                None => {
                    issues.push(path.issue(type_mismatch("object", value)));
                    JsonValue::Null
                }
            },
        }
    }

    /// Render the validator as a JSON Schema document.
    pub fn to_json_schema(&self) -> JsonValue {
        match self {
            Validator::Any => json!({}),
            Validator::String(rules) => {
                let mut schema = JsonObject::new();
                schema.insert("type".into(), json!("string"));
                if let Some(min) = rules.min_len {
                    schema.insert("minLength".into(), json!(min));
                }
                if rules.format == Some(StringFormat::Url) {
                    schema.insert("format".into(), json!("uri"));
                }
                JsonValue::Object(schema)
            }
            Validator::Number => json!({ "type": "number" }),
            Validator::Boolean => json!({ "type": "boolean" }),
            Validator::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            Validator::Record(values) => json!({
                "type": "object",
                "additionalProperties": values.to_json_schema(),
            }),
            Validator::Object(shape) => {
                let mut properties = JsonObject::new();
                for field in shape.fields() {
                    let mut schema = field.validator.to_json_schema();
                    if let Some(map) = schema.as_object_mut() {
                        if let Some(description) = &field.description {
                            map.insert("description".into(), json!(description));
                        }
                        if let Some(default) = &field.default {
                            map.insert("default".into(), default.clone());
                        }
                    }
                    properties.insert(field.name.clone(), schema);
                }
                let required: Vec<&str> = shape
                    .fields()
                    .iter()
                    .filter(|field| field.required)
                    .map(|field| field.name.as_str())
                    .collect();

                let mut schema = JsonObject::new();
                schema.insert("type".into(), json!("object"));
                schema.insert("properties".into(), JsonValue::Object(properties));
                if !required.is_empty() {
                    schema.insert("required".into(), json!(required));
                }
                schema.insert("additionalProperties".into(), json!(false));
                JsonValue::Object(schema)
            }
        }
    }
}

fn check_string_rules(
    text: &str,
    rules: &StringRules,
    path: &IssuePath,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(min) = rules.min_len {
        if text.chars().count() < min {
            let message = rules.message.clone().unwrap_or_else(|| {
                format!("String must contain at least {min} character(s)")
            });
            issues.push(path.issue(message));
        }
    }

    if rules.format == Some(StringFormat::Url) && url::Url::parse(text).is_err() {
        let message = rules
            .message
            .clone()
            .unwrap_or_else(|| "Invalid url".to_string());
        issues.push(path.issue(message));
    }
}

fn check_object(
    shape: &ObjectShape,
    map: &JsonObject,
    path: &mut IssuePath,
    issues: &mut Vec<ValidationIssue>,
) -> JsonObject {
    let mut decoded = JsonObject::new();
    for field in shape.fields() {
        match map.get(&field.name) {
            Some(JsonValue::Null) if !field.required => {
                let value = field.default.clone().unwrap_or(JsonValue::Null);
                decoded.insert(field.name.clone(), value);
            }
            Some(value) => {
                path.push_key(&field.name);
                let checked = field.validator.check(value, path, issues);
                path.pop();
                decoded.insert(field.name.clone(), checked);
            }
            None => match (&field.default, field.required) {
                (Some(default), _) => {
                    decoded.insert(field.name.clone(), default.clone());
                }
                (None, true) => {
                    path.push_key(&field.name);
                    issues.push(path.issue("Required"));
                    path.pop();
                }
                (None, false) => {}
            },
        }
    }
    decoded
}

fn type_mismatch(expected: &str, value: &JsonValue) -> String {
    format!("Expected {expected}, received {}", json_kind(value))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[derive(Debug, Clone)]
enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Default)]
struct IssuePath {
    segments: Vec<PathSegment>,
}

impl IssuePath {
    fn root() -> Self {
        Self::default()
    }

    fn push_key(&mut self, key: &str) {
        self.segments.push(PathSegment::Key(key.to_string()));
    }

    fn push_index(&mut self, index: usize) {
        self.segments.push(PathSegment::Index(index));
    }

    fn pop(&mut self) {
        self.segments.pop();
    }

    fn issue(&self, message: impl Into<String>) -> ValidationIssue {
        ValidationIssue {
            path: self.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for IssuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A single failed check, located by a `$`-rooted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Structured validation failure listing every issue found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "string" },
                "b": { "type": "number" }
            }
        })
    }

    #[test]
    fn translate_never_fails_on_odd_roots() {
        for input in [
            JsonValue::Null,
            json!(42),
            json!("object"),
            json!([1, 2, 3]),
            json!({}),
            json!({ "type": "object" }),
            json!({ "type": "object", "properties": "nope" }),
            json!({ "type": "tuple" }),
            json!({ "type": 7 }),
        ] {
            let validator = translate_value(&input);
            assert!(validator.is_any(), "expected permissive root for {input}");
            assert_eq!(validator.validate(&json!({"x": 1})).unwrap(), json!({"x": 1}));
        }
    }

    #[test]
    fn translate_handles_unknown_kinds_inside_properties() {
        let validator = translate_value(&json!({
            "type": "object",
            "properties": {
                "when": { "type": "date" },
                "count": { "type": "integer" },
                "broken": 12,
                "name": { "type": "string" }
            }
        }));

        let Validator::Object(shape) = &validator else {
            panic!("expected object validator, got {validator:?}");
        };
        assert!(shape.field("when").unwrap().validator.is_any());
        assert!(shape.field("count").unwrap().validator.is_any());
        assert!(shape.field("broken").unwrap().validator.is_any());
        assert_eq!(shape.field("name").unwrap().validator, Validator::string());
    }

    #[test]
    fn translate_survives_deep_nesting() {
        let mut node = json!({ "type": "string" });
        for _ in 0..(MAX_SCHEMA_DEPTH * 2) {
            node = json!({ "type": "object", "properties": { "inner": node } });
        }

        let validator = translate_value(&node);
        assert!(matches!(validator, Validator::Object(_)));
        assert!(validator.validate(&json!({ "inner": {} })).is_ok());
    }

    #[test]
    fn object_schema_accepts_matching_values() {
        let validator = translate_value(&title_schema());
        let decoded = validator.validate(&json!({ "a": "x", "b": 1 })).unwrap();
        assert_eq!(decoded, json!({ "a": "x", "b": 1 }));
    }

    #[test]
    fn object_schema_rejects_wrong_kinds_with_paths() {
        let validator = translate_value(&title_schema());
        let err = validator
            .validate(&json!({ "a": 1, "b": "x" }))
            .expect_err("kinds are swapped");

        assert_eq!(err.issues.len(), 2);
        assert_eq!(err.issues[0].path, "$.a");
        assert_eq!(err.issues[0].message, "Expected string, received number");
        assert_eq!(err.issues[1].path, "$.b");
        assert_eq!(err.issues[1].message, "Expected number, received string");
    }

    #[test]
    fn undeclared_required_fields_are_optional() {
        let validator = translate_value(&title_schema());
        assert_eq!(
            validator.validate(&json!({ "a": "x" })).unwrap(),
            json!({ "a": "x" })
        );
    }

    #[test]
    fn required_list_is_honoured() {
        let validator = translate_value(&json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "number" } },
            "required": ["b"]
        }));
        let err = validator.validate(&json!({ "a": "x" })).unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue {
            path: "$.b".into(),
            message: "Required".into(),
        }]);
    }

    #[test]
    fn undeclared_keys_are_dropped_and_nulls_kept_for_optional_fields() {
        let validator = translate_value(&title_schema());
        let decoded = validator
            .validate(&json!({ "a": null, "b": 2, "extra": true }))
            .unwrap();
        assert_eq!(decoded, json!({ "a": null, "b": 2 }));
    }

    #[test]
    fn arrays_validate_each_item() {
        let validator = translate_value(&json!({
            "type": "object",
            "properties": {
                "companies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } },
                        "required": ["name"]
                    }
                },
                "tags": { "type": "array" }
            }
        }));

        assert!(
            validator
                .validate(&json!({ "companies": [{ "name": "a" }], "tags": [1, "two"] }))
                .is_ok()
        );

        let err = validator
            .validate(&json!({ "companies": [{ "name": "a" }, {}] }))
            .unwrap_err();
        assert_eq!(err.issues[0].path, "$.companies[1].name");
    }

    #[test]
    fn nested_object_without_properties_accepts_any_map() {
        let validator = translate_value(&json!({
            "type": "object",
            "properties": { "meta": { "type": "object" } }
        }));
        let decoded = validator
            .validate(&json!({ "meta": { "k": [1, 2] } }))
            .unwrap();
        assert_eq!(decoded, json!({ "meta": { "k": [1, 2] } }));
        assert!(validator.validate(&json!({ "meta": "flat" })).is_err());
    }

    #[test]
    fn string_rules_use_custom_messages() {
        let validator = Validator::object(vec![
            Field::required("url", Validator::url("Must be a valid URL")),
            Field::required("instruction", Validator::non_empty_string("Instruction is required")),
        ]);

        let err = validator
            .validate(&json!({ "url": "not a url", "instruction": "" }))
            .unwrap_err();
        let messages: Vec<&str> = err.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages, vec!["Must be a valid URL", "Instruction is required"]);
        assert!(err.to_string().contains("$.url: Must be a valid URL"));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let validator = Validator::object(vec![
            Field::optional("fullPage", Validator::Boolean).with_default(json!(true)),
        ]);
        assert_eq!(
            validator.validate(&json!({})).unwrap(),
            json!({ "fullPage": true })
        );
    }

    #[test]
    fn json_schema_rendering_round_trips_through_translate() {
        let source = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "scores": { "type": "array", "items": { "type": "number" } }
            },
            "required": ["title"]
        });
        let validator = translate_value(&source);
        let rendered = validator.to_json_schema();

        assert_eq!(rendered["required"], json!(["title"]));
        assert_eq!(rendered["properties"]["scores"]["items"]["type"], "number");
        assert_eq!(translate_value(&rendered), validator);
    }
}
