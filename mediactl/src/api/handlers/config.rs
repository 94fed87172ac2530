//! Public front-end settings.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AppState, images::RemotePattern};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicConfig {
    /// Hosts images may be loaded from
    pub image_remote_patterns: Vec<RemotePattern>,
}

#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    summary = "Get public config",
    description = "Settings the front-end needs at start-up. Contains nothing secret.",
    responses(
        (status = 200, description = "Public settings", body = PublicConfig),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_public_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(PublicConfig {
        image_remote_patterns: state.images.patterns().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use crate::images::RemotePattern;
    use crate::test_utils::{FakeBackend, create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_default_patterns() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app.get("/api/config").await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        let hostnames: Vec<&str> = body["image_remote_patterns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["hostname"].as_str().unwrap())
            .collect();
        assert_eq!(hostnames, vec!["img.clerk.com", "**.convex.cloud"]);
    }

    #[tokio::test]
    async fn test_configured_patterns() {
        let mut config = create_test_config();
        config.images.remote_patterns = vec![RemotePattern {
            protocol: Some("https".to_string()),
            hostname: "cdn.example".to_string(),
            port: None,
            pathname: Some("/media/**".to_string()),
        }];
        let app = create_test_app(config, Arc::new(FakeBackend::new()));

        let body: Value = app.get("/api/config").await.json();

        assert_eq!(body["image_remote_patterns"][0]["hostname"], "cdn.example");
        assert_eq!(body["image_remote_patterns"][0]["pathname"], "/media/**");
    }
}
