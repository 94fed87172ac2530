//! Stripe client wiring.
//!
//! The secret key stays on the server behind [`PaymentClients::server`]; the publishable key is the
//! only piece handed to browsers, through `GET /api/payments/config`.

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::StripeConfig;

/// Client-safe payment settings for loading Stripe.js
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PublishableConfig {
    pub publishable_key: String,
}

/// Stripe credentials loaded once at start-up
#[derive(Clone)]
pub struct PaymentClients {
    secret_key: String,
    publishable_key: String,
}

impl PaymentClients {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
            publishable_key: config.publishable_key.clone(),
        }
    }

    /// Server-side client, authenticated with the secret key.
    ///
    /// No route issues Stripe calls yet; the only server-side surface is the publishable loader.
    pub fn server(&self) -> stripe::Client {
        stripe::Client::new(&self.secret_key)
    }

    /// Settings a browser may see
    pub fn publishable(&self) -> PublishableConfig {
        PublishableConfig {
            publishable_key: self.publishable_key.clone(),
        }
    }
}

impl std::fmt::Debug for PaymentClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClients")
            .field("publishable_key", &self.publishable_key)
            .finish_non_exhaustive()
    }
}
