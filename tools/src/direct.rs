//! Tools that run on the caller's side through the event-call channel.

use serde_json::{Map, Value};
use toolrelay_types::{DirectToolDefinition, ToolCallEvent, ToolMetadata, ToolOutcome, ToolSpec};
use uuid::Uuid;

use crate::{CallableTool, ToolCtx, ToolError, ToolFut};

/// A tool the caller runs itself.
///
/// Invocation sends an `execute:tool` event through the caller's channel and
/// takes whatever comes back as the result. Consent is the channel's concern,
/// so no authorization check is made here.
#[derive(Debug, Clone)]
pub struct DirectTool {
    spec: ToolSpec,
    server: Value,
    tool_id: Option<String>,
    metadata: ToolMetadata,
}

impl DirectTool {
    #[must_use]
    pub fn from_definition(def: &DirectToolDefinition) -> Self {
        Self {
            spec: def.spec.clone(),
            server: def.server.clone(),
            tool_id: def.tool_id.clone(),
            metadata: def.metadata,
        }
    }
}

impl CallableTool for DirectTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn metadata(&self) -> ToolMetadata {
        self.metadata
    }

    fn tool_id(&self) -> Option<&str> {
        self.tool_id.as_deref()
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn invoke<'a>(&'a self, args: Map<String, Value>, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let event = ToolCallEvent {
                id: Uuid::new_v4().to_string(),
                name: self.spec.name.clone(),
                params: args,
                server: self.server.clone(),
                session_id: ctx.session_id.clone(),
            };
            tracing::debug!(tool = %event.name, id = %event.id, "Dispatching direct tool");

            let value = ctx
                .caller
                .call(&event)
                .await
                .map_err(|source| ToolError::Dispatch {
                    tool: event.name.clone(),
                    source,
                })?;
            Ok(ToolOutcome::completed(value))
        })
    }
}
