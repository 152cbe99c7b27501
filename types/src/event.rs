//! Status and dispatch events exchanged with the caller's transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Action tag stamped on every status event unless overridden.
pub const DEFAULT_STATUS_ACTION: &str = "tool_call";

/// Payload of a `{"type": "status"}` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub action: String,
    pub description: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

impl StatusEvent {
    /// Wire form: `{"type": "status", "data": {...}}`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({ "type": "status", "data": self })
    }
}

/// Fixed vocabulary of progress points in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<'a> {
    /// Before the selector model call.
    Selecting,
    /// Terminal for one call: consent is required first.
    NeedAuthorization { tool: &'a str, auth_url: &'a str },
    /// Before a remote execution call.
    Executing { tool: &'a str },
    /// After a remote execution call returned.
    Executed {
        tool: &'a str,
        status: &'a str,
        elapsed: Duration,
    },
    /// The remote call raised or timed out.
    ExecutionFailed { tool: &'a str },
    /// Selector failure or unknown tool.
    NoResponse,
    /// The list-tools meta tool ran.
    ListedTools,
    /// End of turn.
    AllProcessed { calls: usize },
}

impl Progress<'_> {
    #[must_use]
    pub fn to_status(&self, action: &str) -> StatusEvent {
        let (description, done, auth_url) = match *self {
            Progress::Selecting => ("Selecting right tool".to_string(), false, None),
            Progress::NeedAuthorization { tool, auth_url } => (
                format!("Need to authorize tool {tool}"),
                true,
                Some(auth_url.to_string()),
            ),
            Progress::Executing { tool } => (format!("Executing tool {tool}"), false, None),
            Progress::Executed {
                tool,
                status,
                elapsed,
            } => (
                format!(
                    "Tool {tool} executed with status {status} for {} seconds",
                    elapsed.as_secs()
                ),
                true,
                None,
            ),
            Progress::ExecutionFailed { tool } => {
                (format!("Error executing tool {tool}"), true, None)
            }
            Progress::NoResponse => ("No response from tool".to_string(), true, None),
            Progress::ListedTools => ("List of all tools".to_string(), true, None),
            Progress::AllProcessed { calls } => {
                (format!("All tools processed ({calls} calls)"), true, None)
            }
        };
        StatusEvent {
            action: action.to_string(),
            description,
            done,
            auth_url,
        }
    }
}

/// Out-of-band request asking the caller to run a direct tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub id: String,
    pub name: String,
    pub params: Map<String, Value>,
    pub server: Value,
    pub session_id: Option<String>,
}

impl ToolCallEvent {
    /// Wire form: `{"type": "execute:tool", "data": {...}}`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({ "type": "execute:tool", "data": self })
    }
}
