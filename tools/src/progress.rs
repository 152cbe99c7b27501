//! Progress reporting for a turn: fixed-vocabulary status events sent to the caller.

use std::sync::Arc;

use toolrelay_types::{DEFAULT_STATUS_ACTION, Progress};

use crate::events::{EventSink, NullSink};

/// Emits status events for one turn.
///
/// Delivery is best effort: a failed emit is logged and the turn goes on.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn EventSink>,
    action: String,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            action: DEFAULT_STATUS_ACTION.to_string(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    pub async fn report(&self, progress: Progress<'_>) {
        let event = progress.to_status(&self.action);
        tracing::debug!(description = %event.description, done = event.done, "Status event");
        if let Err(e) = self.sink.emit(&event).await {
            tracing::warn!(description = %event.description, "Failed to deliver status event: {e}");
        }
    }
}
