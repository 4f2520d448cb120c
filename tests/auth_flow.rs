//! End-to-end authentication flows against a stub backend.
//!
//! These tests start a real axum server on a random port and drive the
//! session store, route guard, and facade through the full login, probe,
//! and logout paths.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tempfile::tempdir;
use tokio::time::timeout;

use common::{GOOD_PASSWORD, StubState, VALID_TOKEN, console, start_backend};
use siren_console::session::guard::{GuardState, RouteGuard};
use siren_console::session::{Credentials, LoginOutcome, RegisterOutcome, SessionStore};

const TIMEOUT: Duration = Duration::from_secs(5);

fn bad_credentials() -> Credentials {
    Credentials {
        username: "bob".to_string(),
        password: "wrong".to_string(),
    }
}

fn good_credentials() -> Credentials {
    Credentials {
        username: "bob".to_string(),
        password: GOOD_PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn rejected_login_shows_banner_and_leaves_token_unset() {
    let Some(addr) = start_backend(Arc::new(StubState::default())).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    let outcome = console.store.login(&bad_credentials()).await;

    assert_eq!(outcome, LoginOutcome::Rejected);
    assert_eq!(
        console.store.banner().await.as_deref(),
        Some("Invalid credentials.")
    );
    assert!(!console.store.has_token().await);
    assert!(!console.session_config.session_path.exists());
}

#[tokio::test]
async fn successful_login_persists_the_token_and_survives_restart() {
    let Some(addr) = start_backend(Arc::new(StubState::default())).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    let outcome = console.store.login(&good_credentials()).await;
    assert_eq!(outcome, LoginOutcome::Authenticated);
    assert_eq!(
        console.store.token().await.unwrap().expose_secret(),
        VALID_TOKEN
    );
    assert!(console.session_config.session_path.exists());

    // A fresh store rehydrates the same token without revalidating.
    let rehydrated =
        SessionStore::open(&console.api_config, &console.session_config).await;
    assert_eq!(
        rehydrated.token().await.unwrap().expose_secret(),
        VALID_TOKEN
    );
}

#[tokio::test]
async fn guard_is_optimistic_then_confirmed_by_the_probe() {
    let Some(addr) = start_backend(Arc::new(StubState::default())).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    console.store.login(&good_credentials()).await;
    let guard = RouteGuard::new(Arc::clone(&console.store), Arc::clone(&console.api));

    assert_eq!(guard.state(), GuardState::Loading);
    // The render decision is immediate; the probe runs behind it.
    assert_eq!(guard.resolve().await, GuardState::Authenticated);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(guard.state(), GuardState::Authenticated);
    assert!(console.store.has_token().await);
}

#[tokio::test]
async fn probe_rejection_forces_logout() {
    let state = Arc::new(StubState::default());
    state.probe_rejects.store(true, Ordering::SeqCst);
    let Some(addr) = start_backend(Arc::clone(&state)).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    // A forged/stale token renders the shell for one tick...
    console
        .store
        .set_token(SecretString::from(VALID_TOKEN))
        .await;
    let guard = RouteGuard::new(Arc::clone(&console.store), Arc::clone(&console.api));
    assert_eq!(guard.resolve().await, GuardState::Authenticated);

    // ...and is revoked on the first failed probe round trip.
    let mut states = guard.subscribe();
    timeout(TIMEOUT, async {
        loop {
            if *states.borrow_and_update() == GuardState::Unauthenticated {
                break;
            }
            states.changed().await.expect("guard alive");
        }
    })
    .await
    .expect("probe flips the guard");

    assert!(!console.store.has_token().await);
}

#[tokio::test]
async fn rejected_registration_hands_back_credentials_for_prefill() {
    let Some(addr) = start_backend(Arc::new(StubState::default())).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    let details = siren_console::session::RegisterDetails {
        username: "taken".to_string(),
        email: "taken@example.com".to_string(),
        password: "pw123".to_string(),
        confirm_password: "pw123".to_string(),
    };
    let outcome = console.store.register(&details).await;

    match outcome {
        RegisterOutcome::Rejected { prefill } => {
            assert_eq!(prefill.username, "taken");
            assert_eq!(prefill.password, "pw123");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        console.store.banner().await.as_deref(),
        Some("User already exists.")
    );
    // Registration never authenticates, even on the happy path.
    assert!(!console.store.has_token().await);
}

#[tokio::test]
async fn logout_clears_the_token_and_no_stale_bearer_fires_afterwards() {
    let state = Arc::new(StubState::default());
    let Some(addr) = start_backend(Arc::clone(&state)).await else {
        return;
    };
    let dir = tempdir().unwrap();
    let console = console(addr, dir.path()).await;

    console.store.login(&good_credentials()).await;
    console.api.agents().await;
    {
        let seen = state.seen_auth.lock().unwrap();
        assert_eq!(
            seen.last().unwrap().as_deref(),
            Some(format!("Bearer {VALID_TOKEN}").as_str())
        );
    }

    console.store.logout().await;
    assert!(!console.store.has_token().await);
    assert!(!console.session_config.session_path.exists());

    // Subsequent fetches go out without any Authorization header and
    // degrade to empty results.
    let agents = console.api.agents().await;
    assert!(agents.is_empty());
    let seen = state.seen_auth.lock().unwrap();
    assert_eq!(seen.last().unwrap(), &None);
}
