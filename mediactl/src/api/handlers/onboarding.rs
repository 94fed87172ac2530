//! Onboarding status for the calling user.

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error};

use crate::{
    AppState,
    auth::CurrentUser,
    errors::{Error, Result},
    onboarding::{IdentityState, OnboardingStatus, OnboardingWatcher, QueryState, derive_status},
};

fn identity_of(user: Option<&CurrentUser>) -> IdentityState {
    match user {
        Some(user) => IdentityState::SignedIn(user.id.clone()),
        None => IdentityState::SignedOut,
    }
}

#[utoipa::path(
    get,
    path = "/onboarding",
    tag = "onboarding",
    summary = "Get onboarding status",
    description = "Whether the caller still has to complete onboarding. Anonymous callers are \
        answered without querying the backend.",
    responses(
        (status = 200, description = "Derived status", body = OnboardingStatus),
        (status = 401, description = "Credentials presented but invalid"),
        (status = 500, description = "Backend call failed"),
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_onboarding_status(State(state): State<AppState>, user: Option<CurrentUser>) -> Result<Json<OnboardingStatus>> {
    let identity = identity_of(user.as_ref());
    let IdentityState::SignedIn(user_id) = &identity else {
        return Ok(Json(derive_status(&identity, &QueryState::Skipped)));
    };

    let record = state.backend.onboarding_status(user_id).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "Error checking onboarding status");
        Error::upstream("check onboarding status", e)
    })?;

    Ok(Json(derive_status(&identity, &QueryState::Ready(record))))
}

#[utoipa::path(
    get,
    path = "/onboarding/stream",
    tag = "onboarding",
    summary = "Stream onboarding status",
    description = "Server-sent events carrying the caller's onboarding status as JSON. The current \
        value is sent first, then one event per change.",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = OnboardingStatus),
        (status = 401, description = "Credentials presented but invalid"),
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn stream_onboarding_status(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let identity = identity_of(user.as_ref());
    debug!(?identity, "Opening onboarding status stream");

    // Identity is fixed for the lifetime of one request; dropping the sender tells the watcher so
    let (_, identity_rx) = watch::channel(identity);
    let watcher = OnboardingWatcher::new(state.backend.clone(), state.config.onboarding.poll_interval);
    let (status_rx, _handle) = watcher.spawn(identity_rx, state.shutdown.child_token());

    let events = WatchStream::new(status_rx).map(|status| Event::default().json_data(status));
    Sse::new(events).keep_alive(KeepAlive::default())
}
