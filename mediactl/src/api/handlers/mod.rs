//! Axum route handlers, one module per resource.
//!
//! Handlers receive [`crate::AppState`] and talk to the managed services only through the
//! clients stored there. Errors are returned as [`crate::errors::Error`], which renders the
//! `{"error": ...}` body.

pub mod config;
pub mod forms;
pub mod generations;
pub mod images;
pub mod onboarding;
pub mod payments;
