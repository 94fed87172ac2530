//! Shared helpers for tests: an in-memory document backend, a ready-made configuration and a
//! test server over the full router.

use async_trait::async_trait;
use axum_test::TestServer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use crate::auth::clerk::tests::{TEST_PUBLIC_KEY, sign_session};
use crate::backend::{BackendError, DocumentBackend, OnboardingRecord, Result as BackendResult};
use crate::AppState;
use crate::config::Config;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider once per test binary.
pub fn init_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// In-memory document backend that records how often it was asked.
#[derive(Default)]
pub struct FakeBackend {
    image_urls: HashMap<String, String>,
    onboarding: HashMap<String, OnboardingRecord>,
    failing: bool,
    pub image_calls: AtomicUsize,
    pub onboarding_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose every call fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, storage_id: &str, url: &str) -> Self {
        self.image_urls.insert(storage_id.to_string(), url.to_string());
        self
    }

    pub fn with_onboarding(mut self, user_id: &str, record: OnboardingRecord) -> Self {
        self.onboarding.insert(user_id.to_string(), record);
        self
    }

    fn unavailable(function: &str) -> BackendError {
        BackendError::Status {
            status: 503,
            body: format!("{function}: deployment unavailable"),
        }
    }
}

#[async_trait]
impl DocumentBackend for FakeBackend {
    async fn image_url(&self, storage_id: &str) -> BackendResult<Option<String>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Self::unavailable("files:getImageUrl"));
        }
        Ok(self.image_urls.get(storage_id).cloned())
    }

    async fn onboarding_status(&self, user_id: &str) -> BackendResult<Option<OnboardingRecord>> {
        self.onboarding_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Self::unavailable("users:getOnboardingStatus"));
        }
        Ok(self.onboarding.get(user_id).cloned())
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    // Never contacted: tests inject a FakeBackend
    config.convex.url = Some("http://127.0.0.1:9".to_string());
    config.auth.clerk.jwt_public_key = Some(TEST_PUBLIC_KEY.to_string());
    config.auth.clerk.leeway = Duration::from_secs(0);
    config.onboarding.poll_interval = Duration::from_millis(20);
    config
}

/// Application state over `backend`, for tests that drive the router directly.
pub fn create_test_state(config: Config, backend: Arc<FakeBackend>) -> AppState {
    init_crypto();
    crate::build_state(config, backend).expect("Failed to build application state")
}

/// Full router over `backend`, served in-process.
pub fn create_test_app(config: Config, backend: Arc<FakeBackend>) -> TestServer {
    init_crypto();
    crate::Application::with_backend(config, backend)
        .expect("Failed to create application")
        .into_test_server()
}

/// `Authorization` header carrying a valid session token for `user_id`
pub fn session_header(user_id: &str) -> (String, String) {
    ("authorization".to_string(), format!("Bearer {}", sign_session(user_id, None, 300)))
}
