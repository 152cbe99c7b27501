//! `list_tools`: describes every tool in the catalog.

use serde_json::{Map, Value, json};
use toolrelay_types::{LIST_TOOLS_NAME, Progress, ToolOutcome, ToolSpec};

use crate::{CallableTool, ToolCtx, ToolFut};

/// The synthetic `list_tools` meta tool. Takes no parameters and returns
/// `[{name, description}]` for every catalog tool.
#[derive(Debug, Clone)]
pub struct ListToolsTool {
    spec: ToolSpec,
    entries: Vec<Value>,
}

impl ListToolsTool {
    pub fn new<'a>(catalog: impl IntoIterator<Item = &'a ToolSpec>) -> Self {
        let entries = catalog
            .into_iter()
            .map(|spec| json!({ "name": spec.name, "description": spec.description }))
            .collect();
        Self {
            spec: ToolSpec::new(LIST_TOOLS_NAME, "List of all tools"),
            entries,
        }
    }
}

impl CallableTool for ListToolsTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn invoke<'a>(&'a self, _args: Map<String, Value>, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            ctx.reporter.report(Progress::ListedTools).await;
            Ok(ToolOutcome::completed(Value::Array(self.entries.clone())))
        })
    }
}
