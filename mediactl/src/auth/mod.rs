//! Caller identity.
//!
//! [`CurrentUser`] is an axum extractor. Two sources are tried in order:
//!
//! 1. A Clerk session token, from `Authorization: Bearer <jwt>` or the session cookie
//! 2. A trusted proxy header carrying the user id, when enabled
//!
//! Handlers that must know the caller take `CurrentUser`; handlers that also serve anonymous
//! callers take `Option<CurrentUser>`. Presenting credentials that fail verification is an error
//! in both cases.

pub mod clerk;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use serde::Serialize;
use tracing::{debug, instrument, trace};
use utoipa::ToSchema;

use crate::{
    AppState,
    errors::{Error, Result},
};

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CurrentUser {
    /// Identity-provider user id (e.g. `user_2abc...`)
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Find the session token in the Authorization header or the session cookie
fn session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Result<Option<&'a str>> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|e| Error::BadRequest {
            message: format!("Invalid authorization header: {e}"),
        })?;
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Ok(Some(token.trim()));
        }
    }

    for cookie_header in parts.headers.get_all(header::COOKIE) {
        let Ok(cookies) = cookie_header.to_str() else {
            continue;
        };
        for cookie in cookies.split(';') {
            if let Some((name, value)) = cookie.trim().split_once('=')
                && name == cookie_name
                && !value.is_empty()
            {
                return Ok(Some(value));
            }
        }
    }

    Ok(None)
}

/// Resolve the caller, `Ok(None)` meaning no credentials were presented at all.
#[instrument(skip_all)]
async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>> {
    if let Some(verifier) = &state.clerk {
        match session_token(parts, verifier.cookie_name())? {
            Some(token) => {
                let user = verifier.verify(token)?;
                debug!("Found Clerk session for user: {}", user.id);
                return Ok(Some(user));
            }
            None => trace!("No Clerk session token presented"),
        }
    }

    let proxy = &state.config.auth.proxy_header;
    if proxy.enabled
        && let Some(value) = parts.headers.get(proxy.header_name.as_str())
    {
        let id = value.to_str().map_err(|e| Error::BadRequest {
            message: format!("Invalid {} header: {e}", proxy.header_name),
        })?;
        if !id.trim().is_empty() {
            debug!("Found proxy header user: {}", id);
            return Ok(Some(CurrentUser {
                id: id.trim().to_string(),
                session_id: None,
            }));
        }
    }

    Ok(None)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        authenticate(parts, state).await?.ok_or(Error::Unauthenticated { message: None })
    }
}

impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        authenticate(parts, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/onboarding");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_preferred() {
        let parts = parts(&[("authorization", "Bearer abc.def.ghi"), ("cookie", "__session=zzz")]);
        assert_eq!(session_token(&parts, "__session").unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_session_cookie() {
        let parts = parts(&[("cookie", "theme=dark; __session=tok.en.value; other=1")]);
        assert_eq!(session_token(&parts, "__session").unwrap(), Some("tok.en.value"));
    }

    #[test]
    fn test_no_token() {
        let parts = parts(&[("cookie", "__session_other=1"), ("authorization", "Basic Zm9vOmJhcg==")]);
        assert_eq!(session_token(&parts, "__session").unwrap(), None);
    }
}
