//! HTTP client for the task API.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | call | request |
//! |---|---|
//! | list | `GET {base}/Todo` |
//! | create | `POST {base}/Todo` with the full task |
//! | set completion | `PUT {base}/Todo/{id}` with `{"isCompleted": bool}` |
//! | delete | `DELETE {base}/Todo/{id}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};

use crate::model::{ApiConfig, Todo};

/// Errors from a single API call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API base URL '{0}'")]
    InvalidUrl(String),
    #[error("server unreachable at {url}")]
    Offline { url: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {url}: {detail}")]
    Decode { url: String, detail: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Whether the same request may succeed later without changes.
    ///
    /// Connectivity problems and server-side failures are retryable; other
    /// HTTP errors mean the server looked at the request and refused it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Offline { .. } | ApiError::Timeout { .. } | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::InvalidUrl(_) | ApiError::Decode { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Remote task operations used by the sync engine.
#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Todo>, ApiError>;
    async fn create(&self, todo: &Todo) -> Result<(), ApiError>;
    async fn set_completed(&self, id: &str, is_completed: bool) -> Result<(), ApiError>;
    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// True if the server answers at all (any HTTP status).
    async fn probe(&self) -> bool;
}

/// [`TodoApi`] over HTTP with `reqwest`.
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base() && matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ApiError::InvalidUrl(base_url.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(ApiClient { base, client })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// `{base}/Todo[/{id}]`, with the id percent-encoded as a path segment
    pub(crate) fn todo_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("Todo");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }
}

#[async_trait]
impl TodoApi for ApiClient {
    async fn list(&self) -> Result<Vec<Todo>, ApiError> {
        let url = self.todo_url(None);
        tracing::debug!(%url, "GET");
        let response = self.send(self.client.get(url.clone()), &url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e, &url))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }

    async fn create(&self, todo: &Todo) -> Result<(), ApiError> {
        let url = self.todo_url(None);
        tracing::debug!(%url, id = %todo.id, "POST");
        self.send(self.client.post(url.clone()).json(todo), &url)
            .await?;
        Ok(())
    }

    async fn set_completed(&self, id: &str, is_completed: bool) -> Result<(), ApiError> {
        let url = self.todo_url(Some(id));
        tracing::debug!(%url, is_completed, "PUT");
        let body = serde_json::json!({ "isCompleted": is_completed });
        self.send(self.client.put(url.clone()).json(&body), &url)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let url = self.todo_url(Some(id));
        tracing::debug!(%url, "DELETE");
        self.send(self.client.delete(url.clone()), &url).await?;
        Ok(())
    }

    async fn probe(&self) -> bool {
        let url = self.todo_url(None);
        match self.client.get(url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(%url, error = %e, "probe failed");
                false
            }
        }
    }
}

fn classify_reqwest_error(err: &reqwest::Error, url: &Url) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        ApiError::Offline {
            url: url.to_string(),
        }
    } else {
        ApiError::Transport(err.to_string())
    }
}
