//! # mediactl: backend for the media studio web app
//!
//! `mediactl` is the server half of a thin web application that glues together managed services:
//! a document backend (Convex) that stores files and user records, a payments provider (Stripe),
//! a media-generation queue (fal.ai) and an identity provider (Clerk). It owns no durable state
//! of its own. Every request is answered by calling one of those services through a client
//! built at start-up.
//!
//! ## Request flow
//!
//! ```text
//! client -> router -> handler -> client in AppState -> managed service -> JSON response
//! ```
//!
//! Clients are constructed once in [`Application::new`] and stored in [`AppState`], which axum
//! clones into every handler. Handlers never reach for globals, so tests swap the document
//! backend for an in-memory one through [`Application::with_backend`].
//!
//! ## Core components
//!
//! - [`config`]: layered YAML and environment configuration, validated before the listener binds
//! - [`backend`]: the [`backend::DocumentBackend`] trait and its Convex HTTP client
//! - [`auth`]: the [`auth::CurrentUser`] extractor (Clerk session tokens, or a trusted proxy header)
//! - [`onboarding`]: onboarding status derivation and the poll-and-diff watcher
//! - [`api`]: route handlers
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use mediactl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = mediactl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     mediactl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod forms;
pub mod generation;
pub mod images;
pub mod onboarding;
mod openapi;
pub mod payments;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router,
    body::Body,
    http::{self, HeaderValue, Request},
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    auth::clerk::ClerkVerifier,
    backend::{ConvexClient, DocumentBackend},
    config::CorsOrigin,
    generation::FalClient,
    images::ImageAllowlist,
    openapi::ApiDoc,
    payments::PaymentClients,
};

/// Application state shared across all request handlers.
///
/// Every managed-service client lives here; nothing is reached through globals.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .backend(Arc::new(convex))
///     .fal(fal)
///     .images(allowlist)
///     .maybe_payments(payments)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn DocumentBackend>,
    pub payments: Option<PaymentClients>,
    pub fal: FalClient,
    pub clerk: Option<Arc<ClerkVerifier>>,
    pub images: ImageAllowlist,
    /// Cancelled on shutdown; long-lived streams derive child tokens from it
    #[builder(default)]
    pub shutdown: CancellationToken,
}

/// Build every client from configuration around the given document backend.
pub(crate) fn build_state(config: Config, backend: Arc<dyn DocumentBackend>) -> anyhow::Result<AppState> {
    let clerk = if config.auth.clerk.enabled {
        Some(Arc::new(ClerkVerifier::new(&config.auth.clerk)?))
    } else {
        None
    };
    let payments = config.stripe.as_ref().map(PaymentClients::new);
    let fal = FalClient::configure(&config.fal)?;
    let images = ImageAllowlist::new(config.images.remote_patterns.clone());

    Ok(AppState::builder()
        .backend(backend)
        .maybe_payments(payments)
        .fal(fal)
        .maybe_clerk(clerk)
        .images(images)
        .config(config)
        .build())
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let wildcard = config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
    let origins = if wildcard {
        if config.cors.allow_credentials {
            anyhow::bail!("cors.allowed_origins cannot contain \"*\" while cors.allow_credentials is true");
        }
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers([http::HeaderName::from_static("x-request-id")]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router with every route and the CORS, tracing and request-id layers.
///
/// Each request gets an `x-request-id` (kept when the caller sent one), which is recorded on its
/// tracing span and echoed in the response.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    let api_routes = Router::new()
        .route("/get-image-url", get(handlers::images::get_image_url))
        .route("/onboarding", get(handlers::onboarding::get_onboarding_status))
        .route("/onboarding/stream", get(handlers::onboarding::stream_onboarding_status))
        .route("/forms/project/validate", post(handlers::forms::validate_project_form))
        .route("/payments/config", get(handlers::payments::get_payments_config))
        .route("/generations", post(handlers::generations::submit_generation))
        .route("/generations/{request_id}", get(handlers::generations::get_generation_status))
        .route("/generations/{request_id}/result", get(handlers::generations::get_generation_result))
        .route("/config", get(handlers::config::get_public_config))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()))
        .with_state(state);

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Ok(router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(trace)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors),
    ))
}

/// The assembled service: state, router and bind settings.
pub struct Application {
    router: Router,
    config: Config,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application instance talking to the configured Convex deployment
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting mediactl with configuration: {:#?}", config);

        let convex = ConvexClient::new(&config.convex)?;
        info!("Document backend: {}", config.convex_url().unwrap_or_default());

        Self::with_backend(config, Arc::new(convex))
    }

    /// Create an application over an already-built document backend
    pub fn with_backend(config: Config, backend: Arc<dyn DocumentBackend>) -> anyhow::Result<Self> {
        let state = build_state(config.clone(), backend)?;
        let shutdown = state.shutdown.clone();
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            shutdown,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("mediactl listening on http://{}", listener.local_addr()?);

        // Open event streams hold connections; end them once the signal arrives so the
        // graceful shutdown can complete
        let token = self.shutdown.clone();
        let signal = async move {
            shutdown.await;
            token.cancel();
        };

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(signal)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
