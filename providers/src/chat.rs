//! OpenAI-compatible chat completion client.
//!
//! The selector only needs the final assistant text, so the client collapses
//! both response shapes into `Option<String>`:
//!
//! - `application/json`: `choices[0].message.content`
//! - `text/event-stream`: the last full `message.content` seen, otherwise the
//!   concatenation of every `delta.content`, up to `[DONE]`

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use toolrelay_types::ChatMessage;

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{
    MAX_SSE_BUFFER_BYTES, drain_next_sse_event, endpoint, extract_sse_data, http_client,
    read_capped_error_body, redacted,
};

const COMPLETIONS_PATH: &str = "chat/completions";
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(120);

pub type ChatFut<'a> = Pin<Box<dyn Future<Output = Result<Option<String>, ChatError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid chat endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("chat request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("chat API error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("chat response could not be decoded: {0}")]
    Decode(String),
    #[error("chat stream stalled for {}s", .0.as_secs())]
    Idle(Duration),
    #[error("chat request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Request body for `POST {base}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ChatCompletionRequest {
    /// Non-streamed request with no metadata.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A model that answers one chat completion request.
///
/// `Ok(None)` means the model answered without any text content.
pub trait ChatCompletion: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatCompletionRequest) -> ChatFut<'a>;
}

pub struct HttpChatClient {
    client: reqwest::Client,
    url: url::Url,
    api_key: Option<String>,
    retry: RetryConfig,
    /// Deadline for the whole call, retries and body included.
    timeout: Duration,
}

impl fmt::Debug for HttpChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChatClient")
            .field("url", &self.url.as_str())
            .field("api_key", &redacted(self.api_key.as_deref()))
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpChatClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ChatError> {
        Ok(Self {
            client: http_client().clone(),
            url: endpoint(base_url, COMPLETIONS_PATH)?,
            api_key: api_key.filter(|key| !key.is_empty()),
            retry: RetryConfig::default(),
            timeout: DEFAULT_CHAT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<Option<String>, ChatError> {
        tracing::debug!(model = %request.model, url = %self.url, "Sending chat completion");

        let outcome = send_with_retry(
            || {
                let builder = self.client.post(self.url.clone()).json(request);
                match &self.api_key {
                    Some(key) => builder.bearer_auth(key),
                    None => builder,
                }
            },
            &self.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                return Err(ChatError::Http { status, body });
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(ChatError::Transport { attempts, source });
            }
        };

        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if is_stream {
            read_stream(response, STREAM_IDLE_TIMEOUT).await
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|source| ChatError::Transport {
                    attempts: 1,
                    source,
                })?;
            let json: Value =
                serde_json::from_slice(&body).map_err(|e| ChatError::Decode(e.to_string()))?;
            Ok(message_content(&json).map(str::to_string))
        }
    }
}

impl ChatCompletion for HttpChatClient {
    fn complete<'a>(&'a self, request: &'a ChatCompletionRequest) -> ChatFut<'a> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, self.send(request))
                .await
                .map_err(|_| ChatError::Timeout(self.timeout))?
        })
    }
}

fn message_content(json: &Value) -> Option<&str> {
    json.pointer("/choices/0/message/content")?.as_str()
}

fn delta_content(json: &Value) -> Option<&str> {
    json.pointer("/choices/0/delta/content")?.as_str()
}

async fn read_stream(
    response: reqwest::Response,
    idle_timeout: Duration,
) -> Result<Option<String>, ChatError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut full: Option<String> = None;
    let mut deltas = String::new();

    'read: loop {
        let next = tokio::time::timeout(idle_timeout, stream.next())
            .await
            .map_err(|_| ChatError::Idle(idle_timeout))?;
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|source| ChatError::Transport {
            attempts: 1,
            source,
        })?;
        buffer.extend_from_slice(&chunk);
        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            return Err(ChatError::Decode("SSE buffer exceeded limit".to_string()));
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            let event = String::from_utf8_lossy(&event);
            let Some(data) = extract_sse_data(&event) else {
                continue;
            };
            if data.trim() == "[DONE]" {
                break 'read;
            }
            let json: Value = match serde_json::from_str(&data) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Skipping unparsable chat stream event: {e}");
                    continue;
                }
            };
            if let Some(content) = message_content(&json) {
                full = Some(content.to_string());
            } else if let Some(delta) = delta_content(&json) {
                deltas.push_str(delta);
            }
        }
    }

    Ok(full.or_else(|| (!deltas.is_empty()).then_some(deltas)))
}
