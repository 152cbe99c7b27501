//! Consent check that runs before every remote call.

use std::sync::Arc;
use std::time::Duration;

use toolrelay_providers::ToolService;
use toolrelay_types::{Progress, ToolOutcome};

use crate::progress::ProgressReporter;

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    Authorized,
    /// Execution must not proceed; the outcome is final for this call.
    Halted(ToolOutcome),
}

/// Per-call consent check against the remote service.
///
/// Nothing is cached: consent may be granted or revoked between calls.
#[derive(Clone)]
pub struct AuthorizationGate {
    service: Arc<dyn ToolService>,
    timeout: Duration,
}

impl AuthorizationGate {
    pub fn new(service: Arc<dyn ToolService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn check_and_maybe_halt(
        &self,
        tool_name: &str,
        user_id: &str,
        reporter: &ProgressReporter,
    ) -> AuthResult {
        let response =
            match tokio::time::timeout(self.timeout, self.service.authorize(tool_name, user_id))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::warn!(tool = %tool_name, "Authorization check failed: {e}");
                    return AuthResult::Halted(ToolOutcome::error(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(tool = %tool_name, timeout_secs = self.timeout.as_secs(), "Authorization check timed out");
                    return AuthResult::Halted(ToolOutcome::error(format!(
                        "authorization check timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
            };

        if response.is_completed() {
            return AuthResult::Authorized;
        }

        match response.url.filter(|url| !url.is_empty()) {
            Some(auth_url) => {
                tracing::info!(tool = %tool_name, status = %response.status, "Authorization required");
                reporter
                    .report(Progress::NeedAuthorization {
                        tool: tool_name,
                        auth_url: &auth_url,
                    })
                    .await;
                AuthResult::Halted(ToolOutcome::Pending { auth_url })
            }
            None => {
                tracing::warn!(tool = %tool_name, status = %response.status, "Authorization not completed and no consent URL given");
                AuthResult::Halted(ToolOutcome::error(format!(
                    "authorization status {} without a consent URL",
                    response.status
                )))
            }
        }
    }
}
