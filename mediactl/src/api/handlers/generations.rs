//! Media generation jobs, proxied to the fal queue.
//!
//! All routes require a signed-in caller; the vendor key never leaves the server.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    AppState,
    auth::CurrentUser,
    errors::{Error, Result},
    generation::{GenerationError, GenerationStatus, Submission},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerationRequest {
    /// Model id, e.g. `fal-ai/flux/dev`
    pub model: String,
    /// Model-specific input, forwarded untouched
    #[schema(value_type = Object)]
    pub input: Value,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ModelQuery {
    /// Model id the request was submitted to
    pub model: String,
}

fn map_generation_error(operation: &str, error: GenerationError) -> Error {
    match error {
        GenerationError::InvalidModel(_) | GenerationError::InvalidRequestId(_) => Error::BadRequest {
            message: error.to_string(),
        },
        other => Error::upstream(operation, other),
    }
}

#[utoipa::path(
    post,
    path = "/generations",
    tag = "generations",
    summary = "Submit generation",
    description = "Queue a generation job. Poll its status with the returned request id.",
    request_body = GenerationRequest,
    responses(
        (status = 202, description = "Job queued", body = Submission),
        (status = 400, description = "Malformed model id"),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Generation API call failed"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id, model = %request.model))]
pub async fn submit_generation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<Submission>)> {
    let submission = state
        .fal
        .submit(&request.model, &request.input)
        .await
        .map_err(|e| map_generation_error("submit generation", e))?;

    info!(request_id = %submission.request_id, "Generation queued");
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

#[utoipa::path(
    get,
    path = "/generations/{request_id}",
    tag = "generations",
    summary = "Get generation status",
    params(
        ("request_id" = String, Path, description = "Request id returned on submission"),
        ModelQuery
    ),
    responses(
        (status = 200, description = "Queue status", body = GenerationStatus),
        (status = 400, description = "Malformed model or request id"),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Generation API call failed"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(request_id = %request_id))]
pub async fn get_generation_status(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(request_id): Path<String>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<GenerationStatus>> {
    let status = state
        .fal
        .status(&query.model, &request_id)
        .await
        .map_err(|e| map_generation_error("get generation status", e))?;
    Ok(Json(status))
}

#[utoipa::path(
    get,
    path = "/generations/{request_id}/result",
    tag = "generations",
    summary = "Get generation result",
    description = "The model output of a completed request, as the generation API returned it.",
    params(
        ("request_id" = String, Path, description = "Request id returned on submission"),
        ModelQuery
    ),
    responses(
        (status = 200, description = "Model output", body = serde_json::Value),
        (status = 400, description = "Malformed model or request id"),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Generation API call failed"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(request_id = %request_id))]
pub async fn get_generation_result(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(request_id): Path<String>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<Value>> {
    let result = state
        .fal
        .result(&query.model, &request_id)
        .await
        .map_err(|e| map_generation_error("get generation result", e))?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{FakeBackend, create_test_app, create_test_config, session_header};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_against(server: &MockServer) -> TestServer {
        let mut config = create_test_config();
        config.fal.api_key = Some("fal-secret".to_string());
        config.fal.queue_url = server.uri().parse().unwrap();
        create_test_app(config, Arc::new(FakeBackend::new()))
    }

    #[tokio::test]
    async fn test_submit_requires_sign_in() {
        let server = MockServer::start().await;
        let app = app_against(&server);

        let response = app
            .post("/api/generations")
            .json(&json!({ "model": "fal-ai/flux/dev", "input": { "prompt": "dunes" } }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({ "error": "Authentication required" }));
    }

    #[tokio::test]
    async fn test_submit_queues_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fal-ai/flux/dev"))
            .and(header("authorization", "Key fal-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": "req-42" })))
            .expect(1)
            .mount(&server)
            .await;
        let app = app_against(&server);
        let (name, value) = session_header("user_2abc");

        let response = app
            .post("/api/generations")
            .add_header(&name, &value)
            .json(&json!({ "model": "fal-ai/flux/dev", "input": { "prompt": "dunes" } }))
            .await;

        response.assert_status(StatusCode::ACCEPTED);
        response.assert_json(&json!({ "request_id": "req-42" }));
    }

    #[tokio::test]
    async fn test_status_and_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fal-ai/flux/dev/requests/req-42/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "IN_QUEUE", "queue_position": 3 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fal-ai/flux/dev/requests/req-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": [{ "url": "https://fal.media/a.png" }] })))
            .mount(&server)
            .await;
        let app = app_against(&server);
        let (name, value) = session_header("user_2abc");

        let status = app
            .get("/api/generations/req-42?model=fal-ai/flux/dev")
            .add_header(&name, &value)
            .await;
        status.assert_status(StatusCode::OK);
        status.assert_json(&json!({ "status": "IN_QUEUE", "queue_position": 3 }));

        let result = app
            .get("/api/generations/req-42/result?model=fal-ai/flux/dev")
            .add_header(&name, &value)
            .await;
        result.assert_status(StatusCode::OK);
        result.assert_json(&json!({ "images": [{ "url": "https://fal.media/a.png" }] }));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fal-ai/flux/dev/requests/req-42/status"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream exploded"))
            .mount(&server)
            .await;
        let app = app_against(&server);
        let (name, value) = session_header("user_2abc");

        let response = app
            .get("/api/generations/req-42?model=fal-ai/flux/dev")
            .add_header(&name, &value)
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({ "error": "Failed to get generation status" }));
    }

    #[tokio::test]
    async fn test_malformed_model_rejected() {
        let server = MockServer::start().await;
        let app = app_against(&server);
        let (name, value) = session_header("user_2abc");

        let response = app
            .post("/api/generations")
            .add_header(&name, &value)
            .json(&json!({ "model": "../admin", "input": {} }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
