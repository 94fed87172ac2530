//! Client-safe payment settings.

use axum::{Json, extract::State};

use crate::{
    AppState,
    errors::{Error, Result},
    payments::PublishableConfig,
};

#[utoipa::path(
    get,
    path = "/payments/config",
    tag = "payments",
    summary = "Get payment settings",
    description = "The publishable key browsers use to load Stripe.js. Never includes the secret key.",
    responses(
        (status = 200, description = "Payments are configured", body = PublishableConfig),
        (status = 404, description = "Payments are not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_payments_config(State(state): State<AppState>) -> Result<Json<PublishableConfig>> {
    let payments = state.payments.as_ref().ok_or_else(|| Error::NotFound {
        resource: "Payments configuration".to_string(),
    })?;
    Ok(Json(payments.publishable()))
}

#[cfg(test)]
mod tests {
    use crate::config::StripeConfig;
    use crate::test_utils::{FakeBackend, create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publishable_key_only() {
        let mut config = create_test_config();
        config.stripe = Some(StripeConfig {
            secret_key: "sk_test_secret".to_string(),
            publishable_key: "pk_test_public".to_string(),
        });
        let app = create_test_app(config, Arc::new(FakeBackend::new()));

        let response = app.get("/api/payments/config").await;

        response.assert_status(StatusCode::OK);
        response.assert_json(&json!({ "publishable_key": "pk_test_public" }));
        assert!(!response.text().contains("sk_test_secret"));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let app = create_test_app(create_test_config(), Arc::new(FakeBackend::new()));

        let response = app.get("/api/payments/config").await;

        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({ "error": "Payments configuration not found" }));
    }
}
