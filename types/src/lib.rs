//! Core domain types for toolrelay.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

#![allow(clippy::missing_errors_doc)]

mod catalog;
mod event;
mod message;
mod source;
mod tool;

pub use catalog::{
    DirectToolDefinition, RemoteParameter, RemoteToolDefinition, RemoteToolInput, ToolCatalog,
    ValueSchema,
};
pub use event::{DEFAULT_STATUS_ACTION, Progress, StatusEvent, ToolCallEvent};
pub use message::{ChatMessage, ChatTurn, Role, TurnMetadata};
pub use source::{SourceLabel, SourceMetadata, SourceRecord};
pub use tool::{
    LIST_TOOLS_NAME, ParameterProperty, ParameterSchema, ToolCallRequest, ToolMetadata,
    ToolOutcome, ToolSpec, function_specs_json, parse_function_specs,
};

/// Prefix that marks an inline file payload inside a tool result sequence.
pub const DATA_URI_PREFIX: &str = "data:";
