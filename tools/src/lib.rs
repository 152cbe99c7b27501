//! Callable tool framework: the per-request tool table and every kind of
//! tool that can sit in it.
//!
//! - [`catalog`] adapts remote descriptors into a [`ToolTable`]
//! - [`remote`] runs a remote tool: normalize, gate, execute
//! - [`direct`] hands a call to the caller's event-call channel
//! - [`list`] is the synthetic `list_tools` meta tool
//! - [`progress`] and [`events`] carry status events to the caller

pub mod auth;
pub mod catalog;
pub mod direct;
pub mod events;
pub mod list;
pub mod normalize;
pub mod progress;
pub mod remote;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use toolrelay_types::{ToolMetadata, ToolOutcome, ToolSpec};

pub use auth::{AuthResult, AuthorizationGate};
pub use catalog::{CatalogError, adapt_catalog, spec_from_remote};
pub use direct::DirectTool;
pub use events::{
    CallRequest, ChannelCaller, ChannelSink, DetachedCaller, EventCaller, EventError, EventFut,
    EventSink, NullSink,
};
pub use list::ListToolsTool;
pub use normalize::{EventEndTimeRule, NormalizationRule, NormalizeError, ParameterNormalizer};
pub use progress::ProgressReporter;
pub use remote::{RemoteBackend, RemoteExecutor, RemoteTool};

/// Tool invocation future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<ToolOutcome, ToolError>> + Send + 'a>>;

/// Error types for tool invocation.
///
/// Expected failures of a remote tool (denied consent, failed execution,
/// timeouts) are [`ToolOutcome`] values. A `ToolError` means the call itself
/// could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error("Tool timed out: {tool} after {}s", elapsed.as_secs())]
    Timeout { tool: String, elapsed: Duration },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Dispatch of {tool} failed: {source}")]
    Dispatch {
        tool: String,
        #[source]
        source: EventError,
    },
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything a tool may use while running one call.
pub struct ToolCtx {
    pub user_id: String,
    pub session_id: Option<String>,
    pub reporter: ProgressReporter,
    pub caller: Arc<dyn EventCaller>,
}

impl ToolCtx {
    pub fn new(user_id: impl Into<String>, reporter: ProgressReporter) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            reporter,
            caller: Arc::new(DetachedCaller),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: Arc<dyn EventCaller>) -> Self {
        self.caller = caller;
        self
    }
}

/// A tool the selector can choose.
///
/// Implemented uniformly by remote tools, direct tools and the list-tools
/// meta tool; the engine never looks behind this interface.
pub trait CallableTool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    fn name(&self) -> &str {
        &self.spec().name
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Identifier of the tool server this tool came from, if any.
    fn tool_id(&self) -> Option<&str> {
        None
    }

    /// Dispatched through the caller's event channel instead of run here.
    fn is_direct(&self) -> bool {
        false
    }

    fn invoke<'a>(&'a self, args: Map<String, Value>, ctx: &'a ToolCtx) -> ToolFut<'a>;
}

/// Per-request table of callable tools, in registration order.
///
/// Built once and only read afterwards.
#[derive(Default)]
pub struct ToolTable {
    tools: Vec<Box<dyn CallableTool>>,
    index: HashMap<String, usize>,
}

impl ToolTable {
    pub fn register(&mut self, tool: Box<dyn CallableTool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn CallableTool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn CallableTool, ToolError> {
        self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn CallableTool> {
        self.tools.iter().map(|tool| tool.as_ref())
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.iter().map(|tool| tool.spec())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|tool| tool.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
