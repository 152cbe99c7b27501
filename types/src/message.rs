//! Conversation types: the chat turn handed to the relay and its messages.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Author of a chat message.
///
/// Roles the relay does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(role) => role,
        }
    }

    /// Upper-case label used when rendering history into a prompt.
    #[must_use]
    pub fn label(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

/// A single chat message.
///
/// `content` is kept exactly as received (a string, a list of content parts,
/// or null) along with any fields the relay does not read, so a turn
/// serializes back to what came in. [`ChatMessage::text`] gives the plain-text view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Value::String(content.into())),
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Text of the message. Text parts are joined with newlines and non-text
    /// parts (images, audio) are skipped.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match &self.content {
            None | Some(Value::Null) => Cow::Borrowed(""),
            Some(Value::String(text)) => Cow::Borrowed(text),
            Some(Value::Array(parts)) => Cow::Owned(
                parts
                    .iter()
                    .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }
}

// An explicit `null` stays `Some(Null)` so it serializes back as `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Per-turn metadata carried alongside the messages.
///
/// Only the fields the relay reads are typed; everything else round-trips
/// untouched through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Files previously attached to the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One conversation turn as received from the chat pipeline.
///
/// Top-level fields other than `model`, `messages` and `metadata` are kept
/// in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            metadata: None,
            extra: Map::new(),
        }
    }

    /// Text of the most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<Cow<'_, str>> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(ChatMessage::text)
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.session_id.as_deref()
    }

    #[must_use]
    pub fn attached_files(&self) -> Option<&[Value]> {
        self.metadata.as_ref()?.files.as_deref()
    }

    /// Metadata for editing, created empty if the turn had none.
    pub fn metadata_mut(&mut self) -> &mut TurnMetadata {
        self.metadata.get_or_insert_with(TurnMetadata::default)
    }

    /// Drop previously attached file metadata.
    ///
    /// Returns `true` if anything was removed.
    pub fn drop_attached_files(&mut self) -> bool {
        self.metadata
            .as_mut()
            .and_then(|metadata| metadata.files.take())
            .is_some()
    }
}
