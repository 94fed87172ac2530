//! Convex document backend over the public HTTP query API

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::backend::{BackendError, DocumentBackend, OnboardingRecord, Result};
use crate::config::{ConvexConfig, ConvexFunctions};

/// Reply envelope of `POST /api/query`
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum QueryReply {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

/// Convex client
#[derive(Clone)]
pub struct ConvexClient {
    http: reqwest::Client,
    query_url: String,
    deploy_key: Option<String>,
    functions: ConvexFunctions,
}

impl std::fmt::Debug for ConvexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvexClient").field("query_url", &self.query_url).finish_non_exhaustive()
    }
}

impl ConvexClient {
    /// Create a client for the deployment at `config.url`.
    ///
    /// The URL is checked during config validation; a missing one here is still reported as an
    /// error rather than a panic.
    pub fn new(config: &ConvexConfig) -> Result<Self> {
        let base = config.url.as_deref().ok_or_else(|| BackendError::Function {
            function: "<setup>".to_string(),
            message: "deployment URL is not configured".to_string(),
        })?;

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            query_url: format!("{}/api/query", base.trim_end_matches('/')),
            deploy_key: config.deploy_key.clone(),
            functions: config.functions.clone(),
        })
    }

    /// Run a query function and decode its return value.
    #[instrument(skip(self, args), err)]
    pub async fn query<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T> {
        let mut request = self.http.post(&self.query_url).json(&json!({
            "path": function,
            "args": args,
            "format": "json",
        }));
        if let Some(key) = &self.deploy_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Convex {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let reply = match serde_json::from_str::<QueryReply>(&body) {
            Ok(reply) => reply,
            Err(e) if status.is_success() => return Err(BackendError::Decode(e)),
            Err(_) => {
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
        };

        match reply {
            QueryReply::Success { value } => {
                debug!(function, "query succeeded");
                Ok(serde_json::from_value(value)?)
            }
            QueryReply::Error { error_message } => Err(BackendError::Function {
                function: function.to_string(),
                message: error_message,
            }),
        }
    }
}

#[async_trait]
impl DocumentBackend for ConvexClient {
    async fn image_url(&self, storage_id: &str) -> Result<Option<String>> {
        self.query(&self.functions.image_url, json!({ "storageId": storage_id })).await
    }

    async fn onboarding_status(&self, user_id: &str) -> Result<Option<OnboardingRecord>> {
        self.query(&self.functions.onboarding_status, json!({ "userId": user_id })).await
    }
}
