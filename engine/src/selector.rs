//! Tool selection through a function-calling prompt.
//!
//! The model is asked for a JSON object naming the tool(s) to call. Its reply
//! is parsed leniently: everything between the first `{` and the last `}` is
//! taken as the object, and either a `tool_calls` array or a single call
//! object is accepted.

use std::sync::Arc;

use serde_json::{Value, json};
use toolrelay_providers::{ChatCompletion, ChatCompletionRequest};
use toolrelay_tools::ToolTable;
use toolrelay_types::{ChatMessage, ChatTurn, ToolCallRequest, function_specs_json};

use crate::settings::RelaySettings;

/// Replaced with the JSON function-spec array.
pub const TOOLS_PLACEHOLDER: &str = "{{TOOLS}}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"Available Tools: {{TOOLS}}

Choose the tool or tools from the list above that answer the query. Rules:

- Reply with a single JSON object and nothing else.
- If no tool fits the query, reply with:
  {
    "tool_calls": []
  }
- Otherwise reply with a "tool_calls" array. Each entry has:
  - "name": the tool's name, exactly as listed.
  - "parameters": an object holding the tool's parameters and their values.

Reply format:
{
  "tool_calls": [
    {"name": "toolName1", "parameters": {"key1": "value1"}},
    {"name": "toolName2", "parameters": {"key2": "value2"}}
  ]
}"#;

/// Why a turn ended without any tool call. Never fatal to the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionFailure {
    #[error("selector request failed: {0}")]
    Request(String),
    #[error("selector returned no content")]
    NoContent,
    #[error("selector output is not a JSON object: {0}")]
    Unparsable(String),
    #[error("selector chose no tool")]
    NoToolChosen,
}

/// Slice from the first `{` to the last `}`, inclusive.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Read tool calls out of free-form model text.
///
/// A non-empty `tool_calls` array wins; otherwise the object itself is read
/// as one call. Entries without a string `name` are skipped.
pub fn parse_tool_calls(text: &str) -> Result<Vec<ToolCallRequest>, SelectionFailure> {
    let raw = extract_json_object(text)
        .ok_or_else(|| SelectionFailure::Unparsable("no JSON object found".to_string()))?;
    let value: Value =
        serde_json::from_str(raw).map_err(|e| SelectionFailure::Unparsable(e.to_string()))?;

    let calls: Vec<ToolCallRequest> = match value.get("tool_calls").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries
            .iter()
            .filter_map(|entry| {
                let call = ToolCallRequest::from_value(entry);
                if call.is_none() {
                    tracing::warn!(%entry, "Skipping selector entry without a tool name");
                }
                call
            })
            .collect(),
        _ => ToolCallRequest::from_value(&value).into_iter().collect(),
    };

    if calls.is_empty() {
        return Err(SelectionFailure::NoToolChosen);
    }
    Ok(calls)
}

/// `ROLE: """content"""` lines for the newest `limit` messages, newest first.
#[must_use]
pub fn render_history(messages: &[ChatMessage], limit: usize) -> String {
    messages
        .iter()
        .rev()
        .take(limit)
        .map(|message| format!("{}: \"\"\"{}\"\"\"", message.role.label(), message.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ToolSelector {
    chat: Arc<dyn ChatCompletion>,
    settings: RelaySettings,
}

impl ToolSelector {
    pub fn new(chat: Arc<dyn ChatCompletion>, settings: RelaySettings) -> Self {
        Self { chat, settings }
    }

    /// System prompt with the table's specs embedded.
    #[must_use]
    pub fn system_prompt(&self, table: &ToolTable) -> String {
        let template = self
            .settings
            .prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_TEMPLATE);
        template.replace(TOOLS_PLACEHOLDER, &function_specs_json(table.specs()))
    }

    #[must_use]
    pub fn build_request(&self, turn: &ChatTurn, table: &ToolTable) -> ChatCompletionRequest {
        let history = render_history(&turn.messages, self.settings.history_messages);
        let query = turn.last_user_message().unwrap_or_default();
        let prompt = format!("History:\n{history}\nQuery: {query}");

        ChatCompletionRequest::new(
            self.settings.selector_model(&turn.model),
            vec![
                ChatMessage::system(self.system_prompt(table)),
                ChatMessage::user(format!("Query: {prompt}")),
            ],
        )
        .with_metadata(json!({ "task": "function_calling" }))
    }

    /// Ask the model which tools to call, in the order it listed them.
    pub async fn select(
        &self,
        turn: &ChatTurn,
        table: &ToolTable,
    ) -> Result<Vec<ToolCallRequest>, SelectionFailure> {
        let request = self.build_request(turn, table);
        tracing::debug!(model = %request.model, tools = table.len(), "Selecting tools");

        let content = self
            .chat
            .complete(&request)
            .await
            .map_err(|e| SelectionFailure::Request(e.to_string()))?
            .filter(|content| !content.trim().is_empty())
            .ok_or(SelectionFailure::NoContent)?;
        tracing::debug!(%content, "Selector output");

        let calls = parse_tool_calls(&content)?;
        tracing::debug!(calls = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), "Parsed tool calls");
        Ok(calls)
    }
}
