//! Configuration for toolrelay.
//!
//! Loaded from `~/.toolrelay/config.toml` or an explicit path. A missing file
//! yields defaults; an unreadable or malformed one is an error naming the
//! path. String values support `${VAR}` expansion, and API keys can be
//! overridden from the environment:
//!
//! | Variable                  | Replaces          |
//! |---------------------------|-------------------|
//! | `TOOLRELAY_CHAT_API_KEY`  | `[chat].api_key`  |
//! | `TOOLRELAY_TOOLS_API_KEY` | `[tools].api_key` |

use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use serde::Deserialize;
use thiserror::Error;

pub const CHAT_API_KEY_ENV: &str = "TOOLRELAY_CHAT_API_KEY";
pub const TOOLS_API_KEY_ENV: &str = "TOOLRELAY_TOOLS_API_KEY";

const DEFAULT_CHAT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TOOLS_BASE_URL: &str = "https://api.arcade.dev";
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HISTORY_MESSAGES: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub chat: ChatConfig,
    pub tools: ToolsConfig,
    pub selector: SelectorConfig,
}

/// OpenAI-compatible chat completions endpoint used by the selector.
#[derive(Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Model for the selector call. Falls back to the turn's model.
    pub task_model: Option<String>,
    /// Upper bound for one selector call, retries included.
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            api_key: None,
            task_model: None,
            timeout_secs: DEFAULT_CHAT_TIMEOUT_SECS,
        }
    }
}

/// Remote authorization and execution service.
#[derive(Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Upper bound for each remote authorize/execute call.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TOOLS_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Replaces the built-in selector prompt. Must contain `{{TOOLS}}`.
    pub prompt_template: Option<String>,
    pub history_messages: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            prompt_template: None,
            history_messages: DEFAULT_HISTORY_MESSAGES,
        }
    }
}

fn mask(key: Option<&String>) -> &'static str {
    if key.is_some() { "[REDACTED]" } else { "None" }
}

// Manual Debug impls keep API keys out of logs.
impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(self.api_key.as_ref()))
            .field("task_model", &self.task_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(self.api_key.as_ref()))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Replace every `${VAR}` with the value of `VAR` (empty when unset).
///
/// An unterminated `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, |name| env::var(name).ok())
}

fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl RelayConfig {
    /// Load from the default location, applying environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) => Self::read(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    /// Load from an explicit path, applying environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?.unwrap_or_default();
        config.apply_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}; using defaults", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let config = Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Some(config))
    }

    /// Parse TOML text and expand `${VAR}` references in string values.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.expand(|name| env::var(name).ok());
        Ok(config)
    }

    fn expand(&mut self, lookup: impl Fn(&str) -> Option<String> + Copy) {
        let expand_opt = |value: &mut Option<String>| {
            if let Some(v) = value.as_mut() {
                *v = expand_with(v, lookup);
            }
            if value.as_deref().is_some_and(str::is_empty) {
                *value = None;
            }
        };

        self.chat.base_url = expand_with(&self.chat.base_url, lookup);
        expand_opt(&mut self.chat.api_key);
        expand_opt(&mut self.chat.task_model);
        self.tools.base_url = expand_with(&self.tools.base_url, lookup);
        expand_opt(&mut self.tools.api_key);
        expand_opt(&mut self.selector.prompt_template);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(CHAT_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.chat.api_key = Some(key);
        }
        if let Some(key) = lookup(TOOLS_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.tools.api_key = Some(key);
        }
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toolrelay").join("config.toml"))
}
