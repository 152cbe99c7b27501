//! Tool catalog as described by the remote registry and the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ToolMetadata, ToolSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSchema {
    #[serde(default)]
    pub val_type: String,
}

/// One parameter of a remote tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub value_schema: ValueSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToolInput {
    #[serde(default)]
    pub parameters: Vec<RemoteParameter>,
}

/// A tool hosted by the remote execution service.
///
/// Unknown descriptor fields (requirements, toolkit info, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToolDefinition {
    pub qualified_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: RemoteToolInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

/// A tool the caller runs itself through its event-call channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectToolDefinition {
    pub spec: ToolSpec,
    /// Opaque server descriptor echoed back on dispatch.
    #[serde(default = "empty_object")]
    pub server: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Everything available to one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalog {
    #[serde(default)]
    pub remote: Vec<RemoteToolDefinition>,
    #[serde(default)]
    pub direct: Vec<DirectToolDefinition>,
}

impl ToolCatalog {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remote.is_empty() && self.direct.is_empty()
    }
}
