//! Adapts a tool catalog into a callable tool table.
//!
//! Pure transformation: nothing here talks to the remote service.

use std::sync::Arc;

use toolrelay_types::{LIST_TOOLS_NAME, RemoteToolDefinition, ToolCatalog, ToolSpec};

use crate::direct::DirectTool;
use crate::list::ListToolsTool;
use crate::remote::{RemoteBackend, RemoteTool};
use crate::{CallableTool, ToolTable};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("tool {name} appears more than once in the catalog")]
    DuplicateTool { name: String },
    #[error("tool name list_tools is reserved")]
    ReservedName,
}

/// Function-calling spec for one remote descriptor.
#[must_use]
pub fn spec_from_remote(def: &RemoteToolDefinition) -> ToolSpec {
    def.input.parameters.iter().fold(
        ToolSpec::new(&def.qualified_name, &def.description),
        |spec, param| {
            spec.with_parameter(
                &param.name,
                &param.description,
                &param.value_schema.val_type,
                param.required,
            )
        },
    )
}

/// Build the per-request tool table: remote tools, then direct tools, then
/// the `list_tools` meta tool.
pub fn adapt_catalog(
    catalog: &ToolCatalog,
    backend: &Arc<RemoteBackend>,
) -> Result<ToolTable, CatalogError> {
    let mut table = ToolTable::default();
    let mut specs = Vec::with_capacity(catalog.remote.len() + catalog.direct.len());

    for def in &catalog.remote {
        let spec = spec_from_remote(def);
        specs.push(spec.clone());
        let tool = RemoteTool::new(spec, def.tool_id.clone(), def.metadata, Arc::clone(backend));
        register(&mut table, Box::new(tool))?;
    }

    for def in &catalog.direct {
        specs.push(def.spec.clone());
        register(&mut table, Box::new(DirectTool::from_definition(def)))?;
    }

    register(&mut table, Box::new(ListToolsTool::new(&specs)))?;
    tracing::debug!(tools = table.len(), "Adapted tool catalog");
    Ok(table)
}

fn register(table: &mut ToolTable, tool: Box<dyn CallableTool>) -> Result<(), CatalogError> {
    let name = tool.name().to_string();
    if table.contains(&name) {
        return Err(if name == LIST_TOOLS_NAME {
            CatalogError::ReservedName
        } else {
            CatalogError::DuplicateTool { name }
        });
    }
    table
        .register(tool)
        .map_err(|_| CatalogError::DuplicateTool { name })
}
