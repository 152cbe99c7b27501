use std::time::Duration;

use toolrelay_config::RelayConfig;
use toolrelay_types::DEFAULT_STATUS_ACTION;

/// Runtime knobs for one relay, resolved from [`RelayConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Model for the selector call; `None` uses the turn's own model.
    pub task_model: Option<String>,
    /// Selector system prompt; `None` uses the built-in template.
    pub prompt_template: Option<String>,
    pub history_messages: usize,
    pub tool_timeout: Duration,
    pub status_action: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            task_model: None,
            prompt_template: None,
            history_messages: 4,
            tool_timeout: Duration::from_secs(60),
            status_action: DEFAULT_STATUS_ACTION.to_string(),
        }
    }
}

impl RelaySettings {
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            task_model: config.chat.task_model.clone(),
            prompt_template: config
                .selector
                .prompt_template
                .clone()
                .filter(|template| !template.trim().is_empty()),
            history_messages: config.selector.history_messages,
            tool_timeout: Duration::from_secs(config.tools.timeout_secs.max(1)),
            ..Self::default()
        }
    }

    /// Model the selector should call for a turn addressed to `turn_model`.
    #[must_use]
    pub fn selector_model<'a>(&'a self, turn_model: &'a str) -> &'a str {
        self.task_model.as_deref().unwrap_or(turn_model)
    }
}
