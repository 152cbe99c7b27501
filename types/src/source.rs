//! Source records handed back to the chat pipeline.

use serde::{Deserialize, Serialize};

/// Display name of a source. Empty for anonymous sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLabel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
}

/// Normalized result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceLabel,
    /// Result text first, then any extracted file payloads.
    pub document: Vec<String>,
    pub metadata: Vec<SourceMetadata>,
}

impl SourceRecord {
    /// A source attributed to `label` in the final response.
    pub fn cited(label: impl Into<String>, document: Vec<String>) -> Self {
        let label = label.into();
        Self {
            source: SourceLabel {
                name: Some(label.clone()),
            },
            document,
            metadata: vec![SourceMetadata { source: label }],
        }
    }

    /// A source used as context without attribution.
    pub fn anonymous(label: impl Into<String>, document: Vec<String>) -> Self {
        Self {
            source: SourceLabel::default(),
            document,
            metadata: vec![SourceMetadata {
                source: label.into(),
            }],
        }
    }

    #[must_use]
    pub fn is_cited(&self) -> bool {
        self.source.name.is_some()
    }

    /// Result text of the record.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.document.first().map(String::as_str)
    }
}
