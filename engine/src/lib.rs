//! Turn orchestration for toolrelay.
//!
//! [`ToolRelay::run_turn`] is the single entry point: it adapts the catalog,
//! asks the selector which tools to call, runs them one at a time in the
//! order chosen, and folds every outcome into source records. Nothing that
//! goes wrong inside a turn escapes it.

mod aggregate;
mod selector;
mod settings;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;

use toolrelay_config::RelayConfig;
use toolrelay_providers::{
    ChatCompletion, ChatError, HttpChatClient, HttpToolService, ServiceError, ToolService,
};
use toolrelay_tools::{
    CatalogError, DetachedCaller, EventCaller, EventSink, NullSink, ParameterNormalizer,
    RemoteBackend, ToolCtx, ToolTable, adapt_catalog,
};
use toolrelay_types::{ChatTurn, Progress, SourceRecord, ToolCatalog};

pub use aggregate::{Aggregate, CallError, ResultAggregator, document_parts, source_label};
pub use selector::{
    DEFAULT_PROMPT_TEMPLATE, SelectionFailure, TOOLS_PLACEHOLDER, ToolSelector,
    extract_json_object, parse_tool_calls, render_history,
};
pub use settings::RelaySettings;
pub use toolrelay_tools::ProgressReporter;

/// Failure to construct a relay from configuration.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Caller side of one turn: who is asking, and where events go.
#[derive(Clone)]
pub struct TurnContext {
    pub user_id: String,
    pub sink: Arc<dyn EventSink>,
    pub caller: Arc<dyn EventCaller>,
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl TurnContext {
    /// Events are dropped and direct tools are unavailable until attached.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sink: Arc::new(NullSink),
            caller: Arc::new(DetachedCaller),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: Arc<dyn EventCaller>) -> Self {
        self.caller = caller;
        self
    }
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutput {
    /// The incoming turn, with attached files dropped if a file-handling tool ran.
    pub turn: ChatTurn,
    /// One record per call that produced an outcome, in call order.
    pub sources: Vec<SourceRecord>,
    /// Calls that failed outright.
    pub errors: Vec<CallError>,
}

impl TurnOutput {
    fn unchanged(turn: ChatTurn) -> Self {
        Self {
            turn,
            sources: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub struct ToolRelay {
    selector: ToolSelector,
    backend: Arc<RemoteBackend>,
    settings: RelaySettings,
}

impl ToolRelay {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        service: Arc<dyn ToolService>,
        settings: RelaySettings,
    ) -> Self {
        Self::with_normalizer(chat, service, ParameterNormalizer::default(), settings)
    }

    pub fn with_normalizer(
        chat: Arc<dyn ChatCompletion>,
        service: Arc<dyn ToolService>,
        normalizer: ParameterNormalizer,
        settings: RelaySettings,
    ) -> Self {
        let backend = Arc::new(RemoteBackend::new(
            service,
            normalizer,
            settings.tool_timeout,
        ));
        Self {
            selector: ToolSelector::new(chat, settings.clone()),
            backend,
            settings,
        }
    }

    /// Relay backed by the HTTP chat and tool services named in `config`.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let chat = HttpChatClient::new(&config.chat.base_url, config.chat.api_key.clone())?
            .with_timeout(Duration::from_secs(config.chat.timeout_secs));
        let service = HttpToolService::new(&config.tools.base_url, config.tools.api_key.clone())?;
        Ok(Self::new(
            Arc::new(chat),
            Arc::new(service),
            RelaySettings::from_config(config),
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Callable table for one request. Does not contact the tool service.
    pub fn build_table(&self, catalog: &ToolCatalog) -> Result<ToolTable, CatalogError> {
        adapt_catalog(catalog, &self.backend)
    }

    /// Run one turn against `catalog`.
    ///
    /// A catalog that cannot be adapted is logged and the turn comes back
    /// untouched.
    pub async fn run_turn(
        &self,
        turn: ChatTurn,
        catalog: &ToolCatalog,
        ctx: &TurnContext,
    ) -> TurnOutput {
        match self.build_table(catalog) {
            Ok(table) => self.run_turn_with_table(turn, &table, ctx).await,
            Err(e) => {
                tracing::warn!("Tool catalog rejected: {e}");
                TurnOutput::unchanged(turn)
            }
        }
    }

    pub async fn run_turn_with_table(
        &self,
        mut turn: ChatTurn,
        table: &ToolTable,
        ctx: &TurnContext,
    ) -> TurnOutput {
        let reporter = ProgressReporter::new(Arc::clone(&ctx.sink))
            .with_action(self.settings.status_action.clone());

        reporter.report(Progress::Selecting).await;
        let calls = match self.selector.select(&turn, table).await {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!("No tool selected: {e}");
                reporter.report(Progress::NoResponse).await;
                return TurnOutput::unchanged(turn);
            }
        };

        let tool_ctx = ToolCtx::new(ctx.user_id.clone(), reporter.clone())
            .with_session(turn.session_id().map(str::to_string))
            .with_caller(Arc::clone(&ctx.caller));

        let mut aggregator = ResultAggregator::default();
        let mut dispatched = 0usize;

        for call in calls {
            let Some(tool) = table.get(&call.name) else {
                tracing::warn!(tool = %call.name, "Selector chose an unknown tool");
                reporter.report(Progress::NoResponse).await;
                continue;
            };
            dispatched += 1;

            let args = tool.spec().retain_declared(call.parameters);
            let invocation = AssertUnwindSafe(async { tool.invoke(args, &tool_ctx).await })
                .catch_unwind()
                .await;

            match invocation {
                Ok(Ok(outcome)) => {
                    tracing::info!(tool = %call.name, status = outcome.status(), "Tool call finished");
                    aggregator.record(tool, &outcome);
                }
                Ok(Err(e)) => aggregator.record_failure(&call.name, e.to_string()),
                Err(payload) => {
                    let message = format!("Tool panicked: {}", panic_payload_to_string(&payload));
                    aggregator.record_failure(&call.name, message);
                }
            }
        }

        if dispatched > 0 {
            reporter
                .report(Progress::AllProcessed { calls: dispatched })
                .await;
        }

        let Aggregate {
            sources,
            errors,
            skip_files,
        } = aggregator.finish();
        if skip_files && turn.drop_attached_files() {
            tracing::debug!("Dropped attached files superseded by tool output");
        }

        TurnOutput {
            turn,
            sources,
            errors,
        }
    }
}

fn panic_payload_to_string(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
