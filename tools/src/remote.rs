//! Remote tools: normalize, gate on consent, execute, classify.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use toolrelay_providers::{ExecutionResponse, ToolService};
use toolrelay_types::{Progress, ToolMetadata, ToolOutcome, ToolSpec};

use crate::auth::{AuthResult, AuthorizationGate};
use crate::normalize::ParameterNormalizer;
use crate::progress::ProgressReporter;
use crate::{CallableTool, ToolCtx, ToolFut};

/// Runs one authorized call against the remote service.
#[derive(Clone)]
pub struct RemoteExecutor {
    service: Arc<dyn ToolService>,
    timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(service: Arc<dyn ToolService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Always yields an outcome. Transport failures and timeouts become
    /// `Error` outcomes; a status event is emitted before and after.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
        user_id: &str,
        reporter: &ProgressReporter,
    ) -> ToolOutcome {
        reporter.report(Progress::Executing { tool: tool_name }).await;
        let started = Instant::now();

        let result = tokio::time::timeout(
            self.timeout,
            self.service.execute(tool_name, args, user_id),
        )
        .await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(response)) => {
                tracing::info!(
                    tool = %tool_name,
                    status = %response.status,
                    elapsed_ms = elapsed.as_millis(),
                    "Tool executed"
                );
                reporter
                    .report(Progress::Executed {
                        tool: tool_name,
                        status: &response.status,
                        elapsed,
                    })
                    .await;
                classify(response)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %tool_name, elapsed_ms = elapsed.as_millis(), "Tool execution failed: {e}");
                reporter.report(Progress::ExecutionFailed { tool: tool_name }).await;
                ToolOutcome::error(e.to_string())
            }
            Err(_) => {
                tracing::warn!(tool = %tool_name, timeout_secs = self.timeout.as_secs(), "Tool execution timed out");
                reporter.report(Progress::ExecutionFailed { tool: tool_name }).await;
                ToolOutcome::error(format!(
                    "execution timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

/// Map a remote response onto an outcome.
///
/// `success: false`, a `failed`/`error` status, or an `output.error` make it
/// an error; otherwise the output value (null when absent) is the result.
#[must_use]
pub fn classify(response: ExecutionResponse) -> ToolOutcome {
    let status = response.status;
    let output = response.output.unwrap_or_default();
    let failed = response.success == Some(false)
        || status.eq_ignore_ascii_case("failed")
        || status.eq_ignore_ascii_case("error")
        || output.error.is_some();

    if failed {
        let message = output
            .error
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("remote execution finished with status {status}"));
        return ToolOutcome::error(message);
    }
    ToolOutcome::completed(output.value.unwrap_or(Value::Null))
}

/// State shared by every remote tool of one request.
pub struct RemoteBackend {
    gate: AuthorizationGate,
    executor: RemoteExecutor,
    normalizer: ParameterNormalizer,
}

impl RemoteBackend {
    pub fn new(
        service: Arc<dyn ToolService>,
        normalizer: ParameterNormalizer,
        timeout: Duration,
    ) -> Self {
        Self {
            gate: AuthorizationGate::new(Arc::clone(&service), timeout),
            executor: RemoteExecutor::new(service, timeout),
            normalizer,
        }
    }
}

/// A tool hosted by the remote service.
pub struct RemoteTool {
    spec: ToolSpec,
    tool_id: Option<String>,
    metadata: ToolMetadata,
    backend: Arc<RemoteBackend>,
}

impl RemoteTool {
    pub fn new(
        spec: ToolSpec,
        tool_id: Option<String>,
        metadata: ToolMetadata,
        backend: Arc<RemoteBackend>,
    ) -> Self {
        Self {
            spec,
            tool_id,
            metadata,
            backend,
        }
    }

    async fn run(&self, mut args: Map<String, Value>, ctx: &ToolCtx) -> ToolOutcome {
        let name = self.spec.name.as_str();
        self.backend.normalizer.normalize(name, &mut args);

        let missing = self.spec.missing_required(&args);
        if !missing.is_empty() {
            tracing::warn!(tool = %name, ?missing, "Missing required parameters");
            return ToolOutcome::error(format!(
                "missing required parameters: {}",
                missing.join(", ")
            ));
        }

        match self
            .backend
            .gate
            .check_and_maybe_halt(name, &ctx.user_id, &ctx.reporter)
            .await
        {
            AuthResult::Authorized => {}
            AuthResult::Halted(outcome) => return outcome,
        }

        tracing::debug!(tool = %name, ?args, "Dispatching remote tool");
        self.backend
            .executor
            .execute(name, &args, &ctx.user_id, &ctx.reporter)
            .await
    }
}

impl CallableTool for RemoteTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn metadata(&self) -> ToolMetadata {
        self.metadata
    }

    fn tool_id(&self) -> Option<&str> {
        self.tool_id.as_deref()
    }

    fn invoke<'a>(&'a self, args: Map<String, Value>, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move { Ok(self.run(args, ctx).await) })
    }
}
