//! Route guard: gates the protected shell on session state.
//!
//! The guard is optimistic-then-corrective. A held token renders the shell
//! immediately; a background probe of the protected resource then either
//! confirms it or forces a logout. A stale or forged token can therefore
//! show the shell for one tick before being revoked; the guard must never
//! block first render on the probe round trip.
//!
//! States: `loading -> {authenticated, unauthenticated}` and
//! `authenticated -> unauthenticated` (failed probe or explicit logout).
//! Nothing re-enters `loading` except a fresh construction.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{ApiClient, ProbeOutcome};
use crate::session::SessionStore;

/// Render decision for the application shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Initial token read still pending: render nothing, not the login
    /// flow, to avoid a login flicker.
    Loading,
    Authenticated,
    Unauthenticated,
}

impl GuardState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

/// Session-state machine feeding the shell's render decision.
pub struct RouteGuard {
    store: Arc<SessionStore>,
    api: Arc<ApiClient>,
    state: watch::Sender<GuardState>,
}

impl RouteGuard {
    /// Create a guard in the `Loading` state.
    pub fn new(store: Arc<SessionStore>, api: Arc<ApiClient>) -> Self {
        let (state, _) = watch::channel(GuardState::Loading);
        Self { store, api, state }
    }

    /// Current state without re-evaluating.
    pub fn state(&self) -> GuardState {
        *self.state.borrow()
    }

    /// Observe state flips (probe-driven logout) without polling the store.
    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.subscribe()
    }

    /// Decide from the store's token and kick off the background probe.
    ///
    /// Returns the render decision immediately; the probe is fire-and-forget
    /// relative to it.
    pub async fn resolve(&self) -> GuardState {
        let next = if self.store.has_token().await {
            GuardState::Authenticated
        } else {
            GuardState::Unauthenticated
        };
        tracing::debug!("Route guard resolved to {}", next.as_str());
        self.state.send_replace(next);

        if next == GuardState::Authenticated {
            self.spawn_probe();
        }
        next
    }

    /// Explicit logout: clear the session and flip to unauthenticated.
    pub async fn logout(&self) {
        self.store.logout().await;
        self.state.send_replace(GuardState::Unauthenticated);
    }

    fn spawn_probe(&self) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let state = self.state.clone();

        tokio::spawn(async move {
            match api.probe().await {
                Ok(ProbeOutcome::Valid) => {
                    tracing::debug!("Session probe confirmed the token");
                }
                Ok(ProbeOutcome::Invalid) => {
                    tracing::info!("Backend rejected the session token, logging out");
                    store.logout().await;
                    state.send_replace(GuardState::Unauthenticated);
                }
                // Transport trouble is not invalidity: a flaky network must
                // not log the operator out.
                Err(e) => tracing::warn!("Session probe failed: {}", e),
            }
        });
    }
}
