//! Server-side form validation.

use axum::{Json, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::{Error, Result},
    forms::ProjectForm,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FormValidation {
    pub valid: bool,
}

#[utoipa::path(
    post,
    path = "/forms/project/validate",
    tag = "forms",
    summary = "Validate project form",
    description = "Check a project form against its schema. Field-level messages are returned under `fields`.",
    request_body = ProjectForm,
    responses(
        (status = 200, description = "Form is valid", body = FormValidation),
        (status = 400, description = "Body is not a JSON object of strings"),
        (status = 422, description = "One or more fields failed validation"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn validate_project_form(body: std::result::Result<Json<ProjectForm>, JsonRejection>) -> Result<Json<FormValidation>> {
    let Json(form) = body.map_err(|rejection| Error::BadRequest {
        message: rejection.body_text(),
    })?;
    form.validate()?;
    Ok(Json(FormValidation { valid: true }))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{FakeBackend, create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_valid_form() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app
            .post("/api/forms/project/validate")
            .json(&json!({ "name": "Lumen", "description": "x".repeat(100) }))
            .await;

        response.assert_status(StatusCode::OK);
        response.assert_json(&json!({ "valid": true }));
    }

    #[tokio::test]
    async fn test_invalid_form_reports_fields() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app
            .post("/api/forms/project/validate")
            .json(&json!({ "name": "L", "description": "too short" }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        response.assert_json(&json!({
            "error": "Validation failed",
            "fields": {
                "description": ["Description must be between 100 and 3000 characters."],
                "name": ["Name must be at least 2 characters."]
            }
        }));
    }

    #[tokio::test]
    async fn test_missing_field_reported_as_field_error() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app.post("/api/forms/project/validate").json(&json!({ "name": "L" })).await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        response.assert_json(&json!({
            "error": "Validation failed",
            "fields": {
                "description": ["Description must be between 100 and 3000 characters."],
                "name": ["Name must be at least 2 characters."]
            }
        }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app
            .post("/api/forms/project/validate")
            .json(&json!({ "name": 42, "description": "x".repeat(100) }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].is_string());
        assert!(body.get("fields").is_none());
    }

    #[tokio::test]
    async fn test_only_failing_fields_reported() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app
            .post("/api/forms/project/validate")
            .json(&json!({ "name": "Lumen", "description": "x".repeat(3001) }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = response.json();
        assert!(body["fields"].get("name").is_none());
        assert!(body["fields"].get("description").is_some());
    }
}
