//! Folds tool outcomes into source records for the chat pipeline.

use serde::Serialize;
use serde_json::Value;
use toolrelay_tools::CallableTool;
use toolrelay_types::{DATA_URI_PREFIX, SourceRecord, ToolOutcome};

/// `TOOL:<tool_id>/<name>` for tools that came from a tool server, else the
/// bare name.
#[must_use]
pub fn source_label(tool_name: &str, tool_id: Option<&str>) -> String {
    match tool_id {
        Some(id) => format!("TOOL:{id}/{tool_name}"),
        None => tool_name.to_string(),
    }
}

/// Split a rendered result into document text and inline file payloads.
///
/// Top-level `data:` strings in an array are pulled out as files. Arrays and
/// objects become pretty-printed JSON; strings pass through untouched.
pub fn document_parts(value: Value) -> Result<(String, Vec<String>), serde_json::Error> {
    match value {
        Value::String(text) => Ok((text, Vec::new())),
        Value::Array(items) => {
            let (files, rest): (Vec<Value>, Vec<Value>) = items.into_iter().partition(|item| {
                item.as_str()
                    .is_some_and(|text| text.starts_with(DATA_URI_PREFIX))
            });
            let files = files
                .into_iter()
                .filter_map(|file| match file {
                    Value::String(uri) => Some(uri),
                    _ => None,
                })
                .collect();
            Ok((serde_json::to_string_pretty(&Value::Array(rest))?, files))
        }
        Value::Object(_) => Ok((serde_json::to_string_pretty(&value)?, Vec::new())),
        other => Ok((other.to_string(), Vec::new())),
    }
}

/// A call that produced no source, with the reason as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallError {
    pub tool_name: String,
    pub message: String,
}

/// Everything the aggregator collected over one turn.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub sources: Vec<SourceRecord>,
    pub errors: Vec<CallError>,
    /// A file-handling tool ran; attached files should be dropped.
    pub skip_files: bool,
}

/// Accumulates sources in call order.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    acc: Aggregate,
}

impl ResultAggregator {
    /// Record one outcome. A result that cannot be serialized is recorded as
    /// an error for this call only.
    pub fn record(&mut self, tool: &dyn CallableTool, outcome: &ToolOutcome) {
        let name = tool.name();
        let (text, files) = match document_parts(outcome.render(name)) {
            Ok(parts) => parts,
            Err(e) => {
                self.record_failure(name, format!("Failed to serialize result: {e}"));
                return;
            }
        };

        let label = source_label(name, tool.tool_id());
        let mut document = Vec::with_capacity(1 + files.len());
        document.push(text);
        document.extend(files);

        let record = if tool.metadata().citation || tool.is_direct() {
            SourceRecord::cited(label, document)
        } else {
            SourceRecord::anonymous(label, document)
        };
        tracing::debug!(tool = %name, status = outcome.status(), cited = record.is_cited(), "Recorded source");
        self.acc.sources.push(record);

        if tool.metadata().file_handler {
            self.acc.skip_files = true;
        }
    }

    pub fn record_failure(&mut self, tool_name: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(tool = %tool_name, %message, "Tool call failed");
        self.acc.errors.push(CallError {
            tool_name: tool_name.to_string(),
            message,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.acc.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.acc.sources.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> Aggregate {
        self.acc
    }
}
