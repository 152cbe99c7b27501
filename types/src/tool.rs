//! Tool calling types: specs offered to the selector, the calls it returns,
//! and the outcome of running one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Name of the synthetic tool that lists the catalog.
pub const LIST_TOOLS_NAME: &str = "list_tools";

const PENDING_DESCRIPTION: &str = "Need to get authorization from user with authentication url. \
     Inform user to click on auth button which would be provided near your response";

fn object_type() -> String {
    "object".to_string()
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterProperty {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub title: String,
    /// Value type as reported by the remote catalog (`string`, `integer`, `json`, ...).
    #[serde(rename = "type", default)]
    pub value_type: String,
}

/// Parameter schema in function-calling form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// Description of a callable tool as shown to the selector model.
///
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Qualified name (`Provider.Action`), unique within a tool table.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: ParameterSchema,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::default(),
        }
    }

    /// Add a declared parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        value_type: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required && !self.parameters.required.contains(&name) {
            self.parameters.required.push(name.clone());
        }
        self.parameters.properties.insert(
            name.clone(),
            ParameterProperty {
                description: description.into(),
                title: name,
                value_type: value_type.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn declares(&self, parameter: &str) -> bool {
        self.parameters.properties.contains_key(parameter)
    }

    #[must_use]
    pub fn required_set(&self) -> BTreeSet<&str> {
        self.parameters.required.iter().map(String::as_str).collect()
    }

    /// Keep only arguments whose key is a declared property.
    #[must_use]
    pub fn retain_declared(&self, args: Map<String, Value>) -> Map<String, Value> {
        args.into_iter()
            .filter(|(key, _)| self.declares(key))
            .collect()
    }

    /// Required parameters absent from `args`.
    #[must_use]
    pub fn missing_required<'a>(&'a self, args: &Map<String, Value>) -> Vec<&'a str> {
        self.parameters
            .required
            .iter()
            .filter(|name| !args.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Function-calling representation embedded in the selector prompt.
    #[must_use]
    pub fn to_function_spec(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

/// Serialize specs into the JSON function-spec array used by the selector prompt.
#[must_use]
pub fn function_specs_json<'a>(specs: impl IntoIterator<Item = &'a ToolSpec>) -> String {
    Value::Array(specs.into_iter().map(ToolSpec::to_function_spec).collect()).to_string()
}

/// Parse a JSON function-spec array back into specs.
pub fn parse_function_specs(json: &str) -> Result<Vec<ToolSpec>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Per-tool flags that shape how results are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Attribute the output to the tool by name.
    #[serde(default)]
    pub citation: bool,
    /// The tool's output supersedes files attached to the conversation.
    #[serde(default)]
    pub file_handler: bool,
}

/// A tool call chosen by the selector model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Read a call from loosely shaped model output.
    ///
    /// Returns `None` when `name` is missing or not a string. Non-object
    /// `parameters` are treated as empty.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let parameters = value
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self::new(name, parameters))
    }
}

/// Result of one tool invocation. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The user must grant consent at `auth_url` before the tool can run.
    Pending { auth_url: String },
    Completed { value: Value },
    Error { message: String },
}

impl ToolOutcome {
    pub fn completed(value: impl Into<Value>) -> Self {
        Self::Completed {
            value: value.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Render the outcome as the value folded into a source document.
    ///
    /// Completed outcomes render their raw value, so data URIs in a top-level
    /// array stay extractable; the execution status goes out on the status
    /// event. Pending and error outcomes render a status envelope. The consent
    /// URL travels on the status event, never in the document.
    #[must_use]
    pub fn render(&self, tool_name: &str) -> Value {
        match self {
            Self::Completed { value } => value.clone(),
            Self::Pending { .. } => json!({
                "result": null,
                "status": "pending",
                "description": PENDING_DESCRIPTION,
            }),
            Self::Error { message } => json!({
                "result": null,
                "status": "error",
                "description": format!("Error executing tool {tool_name} with error {message}"),
            }),
        }
    }
}
