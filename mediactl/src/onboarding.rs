//! Onboarding status.
//!
//! The status shown to a caller is a pure function of two inputs: where identity resolution
//! stands, and where the backend query for that identity stands. [`derive_status`] implements
//! that function. [`OnboardingWatcher`] keeps a status current over time by re-running the query
//! on identity changes and on a fixed interval, publishing only when the derived value changes.
//!
//! No query is ever issued while the caller is signed out.

use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::backend::{DocumentBackend, OnboardingRecord};

/// Where identity resolution stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Not yet known
    Loading,
    SignedOut,
    SignedIn(String),
}

/// Where the backend query stands
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Not issued because there is no user to ask about
    Skipped,
    Pending,
    Ready(T),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OnboardingStatus {
    pub is_loaded: bool,
    pub needs_onboarding: bool,
    #[schema(value_type = Object)]
    pub user: Option<serde_json::Value>,
}

impl OnboardingStatus {
    fn loading() -> Self {
        Self {
            is_loaded: false,
            needs_onboarding: false,
            user: None,
        }
    }
}

/// Derive the caller-facing status.
///
/// A signed-in user without any onboarding record needs onboarding.
pub fn derive_status(identity: &IdentityState, query: &QueryState<Option<OnboardingRecord>>) -> OnboardingStatus {
    match (identity, query) {
        (IdentityState::Loading, _) => OnboardingStatus::loading(),
        (IdentityState::SignedOut, _) => OnboardingStatus {
            is_loaded: true,
            needs_onboarding: false,
            user: None,
        },
        (IdentityState::SignedIn(_), QueryState::Skipped | QueryState::Pending) => OnboardingStatus::loading(),
        (IdentityState::SignedIn(_), QueryState::Ready(Some(record))) => OnboardingStatus {
            is_loaded: true,
            needs_onboarding: !record.completed,
            user: record.user.clone(),
        },
        (IdentityState::SignedIn(_), QueryState::Ready(None)) => OnboardingStatus {
            is_loaded: true,
            needs_onboarding: true,
            user: None,
        },
    }
}

/// Poll-and-diff watcher over one identity channel.
pub struct OnboardingWatcher {
    backend: Arc<dyn DocumentBackend>,
    poll_interval: Duration,
}

impl OnboardingWatcher {
    pub fn new(backend: Arc<dyn DocumentBackend>, poll_interval: Duration) -> Self {
        Self { backend, poll_interval }
    }

    /// Start watching. The returned receiver always holds the latest derived status.
    ///
    /// The task ends when `shutdown` is cancelled or every status receiver has been dropped.
    pub fn spawn(
        self,
        identity: watch::Receiver<IdentityState>,
        shutdown: CancellationToken,
    ) -> (watch::Receiver<OnboardingStatus>, JoinHandle<()>) {
        let initial = derive_status(&identity.borrow(), &QueryState::Pending);
        let (status_tx, status_rx) = watch::channel(initial);
        let handle = tokio::spawn(self.run(identity, status_tx, shutdown));
        (status_rx, handle)
    }

    #[instrument(skip_all)]
    async fn run(
        self,
        mut identity: watch::Receiver<IdentityState>,
        status_tx: watch::Sender<OnboardingStatus>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut current = identity.borrow_and_update().clone();
        let mut identity_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Onboarding watcher shutting down");
                    break;
                }
                _ = status_tx.closed() => {
                    debug!("Onboarding watcher has no subscribers left");
                    break;
                }
                changed = identity.changed(), if identity_open => {
                    if changed.is_err() {
                        // Sender gone: the identity is final, keep polling for it
                        identity_open = false;
                        continue;
                    }
                    let next = identity.borrow_and_update().clone();
                    if next == current {
                        continue;
                    }
                    current = next;
                    publish(&status_tx, derive_status(&current, &QueryState::Pending));
                    ticker.reset();
                }
                _ = ticker.tick() => {}
            }

            let user_id = match &current {
                IdentityState::SignedIn(id) => id.clone(),
                IdentityState::SignedOut => {
                    publish(&status_tx, derive_status(&current, &QueryState::Skipped));
                    continue;
                }
                IdentityState::Loading => continue,
            };

            match self.backend.onboarding_status(&user_id).await {
                Ok(record) => publish(&status_tx, derive_status(&current, &QueryState::Ready(record))),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Onboarding status query failed; keeping previous status");
                }
            }
        }
    }
}

/// Publish only when the value differs from what subscribers already have.
fn publish(tx: &watch::Sender<OnboardingStatus>, status: OnboardingStatus) {
    tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });
}
