//! Core data model: tool descriptors, instructions, and iteration records.
//!
//! Tool schemas arrive from providers as untyped JSON Schema. They are turned
//! into ordered `ParamSpec`s once, at discovery time, so the rest of the loop
//! never looks at raw schema again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ─────────────────────────────────────────────
// Tool descriptors
// ─────────────────────────────────────────────

/// Declared type of a tool parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<ParamType>),
    Object,
    /// Any type name we don't coerce; passed through as a string.
    Other(String),
}

impl ParamType {
    /// Read the `type` (and `items`) of one JSON Schema property.
    ///
    /// Nullable unions such as `["integer", "null"]` resolve to the first
    /// non-null member. Arrays without `items` default to integer elements.
    pub fn from_schema(schema: &Value) -> Self {
        let type_name = match schema.get("type") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(|t| t.as_str())
                .find(|t| *t != "null")
                .unwrap_or("unknown")
                .to_string(),
            _ => "unknown".to_string(),
        };

        match type_name.as_str() {
            "string" => ParamType::String,
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            "array" => {
                let items = schema
                    .get("items")
                    .map(ParamType::from_schema)
                    .unwrap_or(ParamType::Integer);
                ParamType::Array(Box::new(items))
            }
            other => ParamType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Array(_) => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
            ParamType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
}

/// A tool as discovered from one provider. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique across all connected providers.
    pub name: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ParamSpec>,
    pub description: String,
    /// Id of the provider that owns this tool.
    pub provider_id: String,
}

impl ToolDescriptor {
    /// Build a descriptor from an MCP-style `inputSchema`.
    ///
    /// Property order is taken from the schema as written (serde_json is
    /// built with `preserve_order`). A schema without `properties` declares
    /// no parameters.
    pub fn from_schema(
        provider_id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        input_schema: &Value,
    ) -> Self {
        let required: Vec<&str> = input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(param_name, schema)| ParamSpec {
                        name: param_name.clone(),
                        param_type: ParamType::from_schema(schema),
                        required: required.contains(&param_name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "No description available".to_string());

        Self {
            name: name.into(),
            parameters,
            description,
            provider_id: provider_id.into(),
        }
    }

    /// `name(a: integer, b?: string)`: optional parameters get a `?`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, marker, p.param_type)
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

// ─────────────────────────────────────────────
// Instructions (parsed model output)
// ─────────────────────────────────────────────

/// One directive parsed from a single model response line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    FunctionCall { name: String, args: Vec<String> },
    FinalAnswer { value: String },
    Error { message: String },
    Uncertain { message: String },
}

impl Instruction {
    /// The grammar keyword for this variant.
    pub fn keyword(&self) -> &'static str {
        match self {
            Instruction::FunctionCall { .. } => "FUNCTION_CALL",
            Instruction::FinalAnswer { .. } => "FINAL_ANSWER",
            Instruction::Error { .. } => "ERROR",
            Instruction::Uncertain { .. } => "UNCERTAIN",
        }
    }

    /// Split an `ERROR`/`UNCERTAIN` message of the form `kind|detail`.
    ///
    /// Returns `None` for the other variants. A message without `|` yields an
    /// empty detail.
    pub fn detail_parts(&self) -> Option<(&str, &str)> {
        let message = match self {
            Instruction::Error { message } | Instruction::Uncertain { message } => message,
            _ => return None,
        };
        Some(match message.split_once('|') {
            Some((kind, detail)) => (kind.trim(), detail.trim()),
            None => (message.trim(), ""),
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::FunctionCall { name, args } => {
                write!(f, "FUNCTION_CALL: {name}")?;
                for arg in args {
                    write!(f, "|{arg}")?;
                }
                Ok(())
            }
            Instruction::FinalAnswer { value } => write!(f, "FINAL_ANSWER: {value}"),
            Instruction::Error { message } => write!(f, "ERROR: {message}"),
            Instruction::Uncertain { message } => write!(f, "UNCERTAIN: {message}"),
        }
    }
}

// ─────────────────────────────────────────────
// Iteration history
// ─────────────────────────────────────────────

/// Why a tool dispatch did not produce output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolFault {
    NotFound,
    ParameterType,
    Execution,
}

/// Result of dispatching a `FunctionCall`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolOutcome {
    Output(String),
    Failed { fault: ToolFault, message: String },
}

impl ToolOutcome {
    pub fn is_output(&self) -> bool {
        matches!(self, ToolOutcome::Output(_))
    }
}

/// What the model produced on one attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Attempt {
    /// A well-formed instruction.
    Parsed(Instruction),
    /// Text that did not match the grammar, kept so the next prompt can quote it.
    Malformed { raw: String, reason: String },
    /// The model call exceeded its timeout.
    TimedOut { timeout_secs: f64 },
    /// The model call failed in transport.
    ModelFailed { message: String },
}

/// One entry in the append-only run history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based, strictly increasing, gapless.
    pub index: usize,
    pub attempt: Attempt,
    pub tool_result: Option<ToolOutcome>,
    pub provider_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    /// The parsed instruction, if this attempt produced one.
    pub fn instruction(&self) -> Option<&Instruction> {
        match &self.attempt {
            Attempt::Parsed(instruction) => Some(instruction),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn math_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" },
                "label": { "type": ["string", "null"] }
            },
            "required": ["a", "b"]
        })
    }

    #[test]
    fn descriptor_keeps_declaration_order() {
        let tool = ToolDescriptor::from_schema("math", "add", Some("Add".into()), &math_schema());
        let names: Vec<&str> = tool.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "label"]);
        assert!(tool.parameters[0].required);
        assert!(!tool.parameters[2].required);
        assert_eq!(tool.parameters[2].param_type, ParamType::String);
    }

    #[test]
    fn descriptor_without_properties_has_no_params() {
        let tool = ToolDescriptor::from_schema("paint", "open_paint", None, &json!({"type": "object"}));
        assert!(tool.parameters.is_empty());
        assert_eq!(tool.description, "No description available");
        assert_eq!(tool.signature(), "open_paint()");
    }

    #[test]
    fn signature_marks_optional() {
        let tool = ToolDescriptor::from_schema("math", "add", None, &math_schema());
        assert_eq!(tool.signature(), "add(a: integer, b: integer, label?: string)");
    }

    #[test]
    fn array_items_default_to_integer() {
        let ty = ParamType::from_schema(&json!({"type": "array"}));
        assert_eq!(ty, ParamType::Array(Box::new(ParamType::Integer)));

        let ty = ParamType::from_schema(&json!({"type": "array", "items": {"type": "number"}}));
        assert_eq!(ty, ParamType::Array(Box::new(ParamType::Number)));
    }

    #[test]
    fn missing_type_is_unknown() {
        let ty = ParamType::from_schema(&json!({"description": "x"}));
        assert_eq!(ty, ParamType::Other("unknown".into()));
        assert_eq!(ty.to_string(), "unknown");
    }

    #[test]
    fn instruction_display_matches_grammar() {
        let call = Instruction::FunctionCall {
            name: "add".into(),
            args: vec!["2".into(), "3".into()],
        };
        assert_eq!(call.to_string(), "FUNCTION_CALL: add|2|3");
        assert_eq!(call.keyword(), "FUNCTION_CALL");

        let answer = Instruction::FinalAnswer { value: "42".into() };
        assert_eq!(answer.to_string(), "FINAL_ANSWER: 42");
    }

    #[test]
    fn detail_parts_split_on_first_pipe() {
        let err = Instruction::Error {
            message: "INVALID_INPUT|Number too large|really".into(),
        };
        assert_eq!(err.detail_parts(), Some(("INVALID_INPUT", "Number too large|really")));

        let unsure = Instruction::Uncertain { message: "AMBIGUOUS".into() };
        assert_eq!(unsure.detail_parts(), Some(("AMBIGUOUS", "")));

        let answer = Instruction::FinalAnswer { value: "1".into() };
        assert_eq!(answer.detail_parts(), None);
    }
}
