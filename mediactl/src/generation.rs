//! fal.ai queue client.
//!
//! Generation jobs go through the fal queue: a submit call returns a request id, and the status
//! and result of that request are then fetched separately. The client is obtained from
//! [`FalClient::configure`], which reads the credential once; requests are sent without an
//! `Authorization` header when no key was configured and fal answers those with 401.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use url::Url;
use utoipa::ToSchema;

use crate::config::FalConfig;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid model id '{0}'")]
    InvalidModel(String),

    #[error("Invalid request id '{0}'")]
    InvalidRequestId(String),
}

fn is_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
}

/// Queue submission receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
}

/// Queue status of a request (`IN_QUEUE`, `IN_PROGRESS` or `COMPLETED`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerationStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
}

#[derive(Clone)]
pub struct FalClient {
    http: reqwest::Client,
    queue_url: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for FalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FalClient")
            .field("queue_url", &self.queue_url.as_str())
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl FalClient {
    /// Configure the client from settings. Must run before any generation call.
    pub fn configure(config: &FalConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            queue_url: config.queue_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, model: &str, suffix: &[&str]) -> Result<String> {
        if model.is_empty() || !model.split('/').all(is_path_segment) {
            return Err(GenerationError::InvalidModel(model.to_string()));
        }
        if let Some(bad) = suffix.iter().find(|part| !is_path_segment(part)) {
            return Err(GenerationError::InvalidRequestId(bad.to_string()));
        }

        let mut url = format!("{}/{}", self.queue_url.as_str().trim_end_matches('/'), model);
        for part in suffix {
            url.push('/');
            url.push_str(part);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, format!("Key {key}")),
            None => request,
        }
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Queue a generation job for `model` (e.g. `fal-ai/flux/dev`).
    #[instrument(skip(self, input), err)]
    pub async fn submit(&self, model: &str, input: &Value) -> Result<Submission> {
        let url = self.endpoint(model, &[])?;
        let response = self.authorize(self.http.post(url).json(input)).send().await?;
        Self::read(response).await
    }

    #[instrument(skip(self), err)]
    pub async fn status(&self, model: &str, request_id: &str) -> Result<GenerationStatus> {
        let url = self.endpoint(model, &["requests", request_id, "status"])?;
        let response = self.authorize(self.http.get(url)).send().await?;
        Self::read(response).await
    }

    #[instrument(skip(self), err)]
    pub async fn result(&self, model: &str, request_id: &str) -> Result<Value> {
        let url = self.endpoint(model, &["requests", request_id])?;
        let response = self.authorize(self.http.get(url)).send().await?;
        Self::read(response).await
    }
}
