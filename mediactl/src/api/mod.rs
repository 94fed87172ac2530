//! HTTP API.
//!
//! All JSON routes live under `/api`:
//!
//! - `GET /api/get-image-url`: resolve a storage id to a servable URL
//! - `GET /api/onboarding`, `GET /api/onboarding/stream`: onboarding status for the caller
//! - `POST /api/forms/project/validate`: check a project form against its schema
//! - `GET /api/payments/config`: publishable payment settings
//! - `POST /api/generations`, `GET /api/generations/{request_id}[/result]`: media generation jobs
//! - `GET /api/config`: public settings for the front-end
//!
//! Every handler is annotated for `utoipa`; the document is served at `/api/openapi.json` and
//! rendered at `/api/docs`.

pub mod handlers;
