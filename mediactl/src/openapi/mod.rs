//! OpenAPI document for the `/api` surface, served as JSON at `/api/openapi.json` and rendered
//! with Scalar at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::handlers;

/// Session token schemes issued by the identity provider.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Clerk session token: `Authorization: Bearer <token>`"))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "__session",
                    "Clerk session cookie set by the front-end",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "mediactl API",
        description = "Storage URL resolution, onboarding status and managed-service wiring for the media studio."
    ),
    servers((url = "/api")),
    paths(
        handlers::images::get_image_url,
        handlers::onboarding::get_onboarding_status,
        handlers::onboarding::stream_onboarding_status,
        handlers::forms::validate_project_form,
        handlers::payments::get_payments_config,
        handlers::generations::submit_generation,
        handlers::generations::get_generation_status,
        handlers::generations::get_generation_result,
        handlers::config::get_public_config,
    ),
    components(schemas(
        handlers::images::ImageUrlResponse,
        handlers::forms::FormValidation,
        handlers::generations::GenerationRequest,
        handlers::config::PublicConfig,
        crate::onboarding::OnboardingStatus,
        crate::forms::ProjectForm,
        crate::payments::PublishableConfig,
        crate::generation::Submission,
        crate::generation::GenerationStatus,
        crate::images::RemotePattern,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "images", description = "Storage URL resolution"),
        (name = "onboarding", description = "Onboarding status"),
        (name = "forms", description = "Form validation"),
        (name = "payments", description = "Payment settings"),
        (name = "generations", description = "Media generation jobs"),
        (name = "config", description = "Public settings"),
    )
)]
pub struct ApiDoc;
