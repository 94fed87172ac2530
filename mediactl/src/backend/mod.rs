//! Document backend abstraction layer
//!
//! This module defines the `DocumentBackend` trait which abstracts the two queries this service
//! issues against the managed document store: resolving a storage identifier to a URL, and
//! reading a user's onboarding record. Handlers only see the trait, so tests and alternative
//! deployments can swap the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod convex;

pub use convex::ConvexClient;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while talking to the document backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend function {function} failed: {message}")]
    Function { function: String, message: String },

    #[error("Unexpected backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A user's onboarding record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OnboardingRecord {
    pub completed: bool,
    /// The user document, passed through untouched
    #[serde(default)]
    #[schema(value_type = Object)]
    pub user: Option<serde_json::Value>,
}

/// Abstract document backend interface
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Resolve a storage identifier to a servable URL.
    ///
    /// Returns `Ok(None)` when the backend has no object for this identifier.
    async fn image_url(&self, storage_id: &str) -> Result<Option<String>>;

    /// Fetch the onboarding record for a user.
    ///
    /// Returns `Ok(None)` when the backend knows no record for the user yet.
    async fn onboarding_status(&self, user_id: &str) -> Result<Option<OnboardingRecord>>;
}
