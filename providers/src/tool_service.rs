//! Remote tool service: per-user authorization and execution.
//!
//! Wire format:
//!
//! - `POST {base}/v1/tools/authorize` with `{"tool_name", "user_id"}` returns
//!   `{"status", "url"?}`; any status other than `completed` means the user
//!   still has to visit `url`.
//! - `POST {base}/v1/tools/execute` with `{"tool_name", "input", "user_id"}`
//!   returns `{"status", "success"?, "output"?: {"value"?, "error"?: {"message"}}}`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{endpoint, http_client, read_capped_error_body, redacted};

const AUTHORIZE_PATH: &str = "v1/tools/authorize";
const EXECUTE_PATH: &str = "v1/tools/execute";

/// Authorization status meaning consent is already on file.
pub const AUTH_COMPLETED: &str = "completed";

pub type ServiceFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid tool service endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("tool service request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("tool service error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("tool service response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AuthorizationResponse {
    pub fn completed() -> Self {
        Self {
            status: AUTH_COMPLETED.to_string(),
            url: None,
        }
    }

    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            status: "pending".to_string(),
            url: Some(url.into()),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == AUTH_COMPLETED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub error: Option<ExecutionError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub output: Option<ExecutionOutput>,
}

impl ExecutionResponse {
    /// A successful response carrying `value`.
    pub fn success(value: Value) -> Self {
        Self {
            status: "success".to_string(),
            success: Some(true),
            output: Some(ExecutionOutput {
                value: Some(value),
                error: None,
            }),
        }
    }

    /// A failed response carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            success: Some(false),
            output: Some(ExecutionOutput {
                value: None,
                error: Some(ExecutionError {
                    message: message.into(),
                }),
            }),
        }
    }
}

/// Remote authorization and execution of qualified tools on behalf of a user.
pub trait ToolService: Send + Sync {
    fn authorize<'a>(
        &'a self,
        tool_name: &'a str,
        user_id: &'a str,
    ) -> ServiceFut<'a, AuthorizationResponse>;

    fn execute<'a>(
        &'a self,
        tool_name: &'a str,
        input: &'a Map<String, Value>,
        user_id: &'a str,
    ) -> ServiceFut<'a, ExecutionResponse>;
}

pub struct HttpToolService {
    client: reqwest::Client,
    authorize_url: url::Url,
    execute_url: url::Url,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl fmt::Debug for HttpToolService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpToolService")
            .field("authorize_url", &self.authorize_url.as_str())
            .field("execute_url", &self.execute_url.as_str())
            .field("api_key", &redacted(self.api_key.as_deref()))
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AuthorizeBody<'a> {
    tool_name: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
struct ExecuteBody<'a> {
    tool_name: &'a str,
    input: &'a Map<String, Value>,
    user_id: &'a str,
}

impl HttpToolService {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client().clone(),
            authorize_url: endpoint(base_url, AUTHORIZE_PATH)?,
            execute_url: endpoint(base_url, EXECUTE_PATH)?,
            api_key: api_key.filter(|key| !key.is_empty()),
            retry: RetryConfig::default(),
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

    async fn post<B, T>(&self, url: &url::Url, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let outcome = send_with_retry(
            || {
                let builder = self.client.post(url.clone()).json(body);
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
                return Err(ServiceError::Http { status, body });
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(ServiceError::Transport { attempts, source });
            }
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ServiceError::Transport {
                attempts: 1,
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

impl ToolService for HttpToolService {
    fn authorize<'a>(
        &'a self,
        tool_name: &'a str,
        user_id: &'a str,
    ) -> ServiceFut<'a, AuthorizationResponse> {
        Box::pin(async move {
            let body = AuthorizeBody { tool_name, user_id };
            self.post(&self.authorize_url, &body).await
        })
    }

    fn execute<'a>(
        &'a self,
        tool_name: &'a str,
        input: &'a Map<String, Value>,
        user_id: &'a str,
    ) -> ServiceFut<'a, ExecutionResponse> {
        Box::pin(async move {
            let body = ExecuteBody {
                tool_name,
                input,
                user_id,
            };
            self.post(&self.execute_url, &body).await
        })
    }
}
