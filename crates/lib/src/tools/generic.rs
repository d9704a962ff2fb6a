//! Generic agent tools exposed by the backend at `/agent-tools/`.
//! Each tool carries a JSON-schema-like parameter description; raw user input is coerced
//! to the declared types before execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{self, ApiClient, ApiError};

/// A backend tool and its parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: ToolParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Parameter name -> schema, in declaration order.
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Schema of a single parameter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "enum", default)]
    pub choices: Option<Vec<String>>,
}

impl Tool {
    /// Schema for `name`; unknown or malformed entries read as untyped strings.
    pub fn parameter(&self, name: &str) -> Option<ParameterSchema> {
        self.parameters
            .properties
            .get(name)
            .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &String> {
        self.parameters.properties.keys()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.parameters.required.iter().any(|r| r == name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ToolError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("missing required parameter: {0}")]
    MissingRequired(String),
    #[error("invalid value for {name}: {value:?} (expected {expected})")]
    InvalidValue {
        name: String,
        value: String,
        expected: String,
    },
}

/// Convert raw text to the parameter's declared type. Numbers are read from their leading
/// numeric prefix and fall back to 0 when there is none.
pub fn coerce_parameter(name: &str, schema: &ParameterSchema, raw: &str) -> Result<Value, ToolError> {
    let invalid = |expected: String| ToolError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
        expected,
    };
    match schema.kind.as_str() {
        "integer" => Ok(Value::from(leading_int(raw).unwrap_or(0))),
        "number" => {
            let f = leading_float(raw).unwrap_or(0.0);
            Ok(serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::from(0)))
        }
        "boolean" => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "no" | "n" | "0" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(invalid("true or false".to_string())),
        },
        "string" if schema.choices.is_some() => {
            let choices = schema.choices.as_deref().unwrap_or_default();
            if choices.iter().any(|c| c == raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(invalid(format!("one of {}", choices.join(", "))))
            }
        }
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Coerce `name=value` pairs against the tool's schema and check required parameters.
pub fn build_parameters(
    tool: &Tool,
    raw: &[(String, String)],
) -> Result<Map<String, Value>, ToolError> {
    let mut params = Map::new();
    for (name, value) in raw {
        let schema = tool
            .parameter(name)
            .ok_or_else(|| ToolError::UnknownParameter(name.clone()))?;
        params.insert(name.clone(), coerce_parameter(name, &schema, value)?);
    }
    if let Some(missing) = tool
        .parameters
        .required
        .iter()
        .find(|r| !params.contains_key(r.as_str()))
    {
        return Err(ToolError::MissingRequired(missing.clone()));
    }
    Ok(params)
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(f) = s.parse::<f64>() {
        return f.is_finite().then_some(f);
    }
    let end = s
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    (1..=end)
        .rev()
        .find_map(|i| s[..i].parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

#[derive(Debug, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    tool_name: &'a str,
    parameters: &'a Map<String, Value>,
}

/// Lists and runs backend tools.
#[derive(Clone)]
pub struct ToolConsole {
    api: ApiClient,
}

impl ToolConsole {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// GET /agent-tools/
    pub async fn list(&self) -> Result<Vec<Tool>, ApiError> {
        let res = self.api.get(&self.api.root("/agent-tools/")).send().await?;
        let list: ToolList = api::read_json(res).await?;
        log::debug!("tools: listed {}", list.tools.len());
        Ok(list.tools)
    }

    /// POST /agent-tools/execute. Failures come back as `{"success": false, "error": ...}`.
    pub async fn execute(&self, tool_name: &str, parameters: &Map<String, Value>) -> Value {
        match self.try_execute(tool_name, parameters).await {
            Ok(v) => v,
            Err(e) => {
                log::error!("failed to execute tool {}: {}", tool_name, e);
                serde_json::json!({ "success": false, "error": e.to_string() })
            }
        }
    }

    async fn try_execute(
        &self,
        tool_name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let res = self
            .api
            .post(&self.api.root("/agent-tools/execute"))
            .json(&ExecuteRequest {
                tool_name,
                parameters,
            })
            .send()
            .await?;
        api::read_json(res).await
    }
}
