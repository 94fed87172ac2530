//! Clerk session token verification.
//!
//! Session tokens are RS256 JWTs signed by the Clerk instance. They are verified locally against
//! the instance's PEM public key, so no request to Clerk is made per call.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{auth::CurrentUser, config::ClerkAuthConfig, errors::Error};

/// Claims of a Clerk session token that this service reads
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,         // Clerk user id
    pub sid: Option<String>, // Session id
    pub azp: Option<String>, // Authorized party (origin that requested the token)
    pub exp: i64,
    #[serde(default)]
    pub nbf: Option<i64>,
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            session_id: claims.sid,
        }
    }
}

/// Verifier built once from configuration
#[derive(Clone)]
pub struct ClerkVerifier {
    key: DecodingKey,
    validation: Validation,
    authorized_parties: Vec<String>,
    cookie_name: String,
}

impl ClerkVerifier {
    pub fn new(config: &ClerkAuthConfig) -> Result<Self, Error> {
        let pem = config.jwt_public_key.as_deref().ok_or_else(|| Error::Internal {
            operation: "configure Clerk: jwt_public_key is required".to_string(),
        })?;
        // Keys pasted into env files often carry literal "\n" sequences
        let pem = pem.replace("\\n", "\n");
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| Error::Internal {
            operation: format!("parse Clerk JWT public key: {e}"),
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = config.leeway.as_secs();
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            key,
            validation,
            authorized_parties: config.authorized_parties.clone(),
            cookie_name: config.session_cookie_name.clone(),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Verify and decode a session token
    pub fn verify(&self, token: &str) -> Result<CurrentUser, Error> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => Error::Unauthenticated {
                message: Some("Session expired".to_string()),
            },
            _ => Error::Unauthenticated {
                message: Some("Invalid session token".to_string()),
            },
        })?;

        if !self.authorized_parties.is_empty() {
            let azp = data.claims.azp.as_deref().unwrap_or_default();
            if !self.authorized_parties.iter().any(|party| party == azp) {
                return Err(Error::Unauthenticated {
                    message: Some("Invalid session token".to_string()),
                });
            }
        }

        Ok(data.claims.into())
    }
}
