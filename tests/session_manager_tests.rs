mod support;

use std::sync::Arc;
use std::time::Duration;

use comiccoin_auth::config::SessionConfig;
use comiccoin_auth::error::SessionError;
use comiccoin_auth::session::{SessionPhase, SessionTokenManager};
use comiccoin_auth::storage::{KeyValueStore, MemoryStore};
use comiccoin_auth::util::retry::RetryPolicy;
use futures::future::join_all;
use pretty_assertions::assert_eq;

use support::{in_secs, memory_manager, pair, wait_until, FailingStore, GatedRefreshClient, Outcome};

#[test]
fn clear_tokens_is_idempotent() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (store, manager) = memory_manager(client);
    manager.login(pair("A1", "R1", in_secs(600)));

    manager.clear_tokens();
    assert!(manager.get_tokens().is_none());
    assert!(!manager.is_authenticated());

    manager.clear_tokens();
    assert!(manager.get_tokens().is_none());
    assert!(!manager.is_authenticated());
    assert!(store.get("auth").unwrap().is_none());
}

#[test]
fn tokens_survive_a_fresh_manager_on_the_same_store() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (store, manager) = memory_manager(client.clone());
    let original = pair("A1", "R1", 1_700_000_000_000);
    manager.set_tokens(Some(original.clone()));

    let reloaded = support::manager(store, client);
    assert_eq!(reloaded.get_tokens(), Some(original));
    assert_eq!(reloaded.phase(), SessionPhase::LoggedIn);
}

#[test]
fn second_resolution_expiry_is_stored_as_millis() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (store, manager) = memory_manager(client);

    manager.set_tokens(Some(pair("A1", "R1", 1_700_000_000)));
    assert_eq!(manager.get_tokens().unwrap().expires_at, 1_700_000_000_000);
    let raw: serde_json::Value = serde_json::from_str(&store.get("auth").unwrap().unwrap()).unwrap();
    assert_eq!(raw["tokens"]["expiresAt"], 1_700_000_000_000_i64);
    assert_eq!(raw["isAuthenticated"], true);

    manager.set_tokens(Some(pair("A1", "R1", 1_700_000_000_000)));
    assert_eq!(manager.get_tokens().unwrap().expires_at, 1_700_000_000_000);
}

#[test]
fn setting_none_clears_the_session() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (store, manager) = memory_manager(client);
    manager.login(pair("A1", "R1", in_secs(600)));
    manager.set_tokens(None);
    assert!(manager.get_tokens().is_none());
    assert!(store.is_empty());
}

#[test]
fn clearing_removes_legacy_key_too() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (store, manager) = memory_manager(client);
    store.set("auth-storage", "{\"state\":{}}").unwrap();
    manager.login(pair("A1", "R1", in_secs(600)));

    manager.logout();
    assert!(store.get("auth").unwrap().is_none());
    assert!(store.get("auth-storage").unwrap().is_none());
}

#[test]
fn corrupt_or_partial_storage_starts_logged_out() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    for raw in [
        "{not-json",
        r#"{"isAuthenticated":true}"#,
        r#"{"tokens":{"accessToken":"A1","refreshToken":"","expiresAt":1},"isAuthenticated":true}"#,
    ] {
        let store = Arc::new(MemoryStore::new());
        store.set("auth", raw).unwrap();
        let manager = support::manager(store, client.clone());
        assert!(manager.get_tokens().is_none(), "expected no session for {raw}");
        assert_eq!(manager.phase(), SessionPhase::LoggedOut);
    }
}

#[tokio::test]
async fn storage_failures_do_not_break_the_in_memory_session() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let store = Arc::new(FailingStore::default());
    let manager = support::manager(store.clone(), client);
    assert!(manager.get_tokens().is_none());

    manager.login(pair("A1", "R1", in_secs(1)));
    assert_eq!(manager.get_tokens().unwrap().access_token, "A1");
    assert!(manager.refresh().await);
    assert_eq!(manager.get_tokens().unwrap().access_token, "A2");

    manager.logout();
    assert!(!manager.is_authenticated());
    assert!(store.attempts.load(std::sync::atomic::Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn second_refresh_while_in_flight_returns_false_without_a_call() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let (_store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let leader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    wait_until(|| client.calls() == 1).await;
    assert!(manager.is_refreshing());
    assert_eq!(manager.phase(), SessionPhase::Refreshing);

    assert!(!manager.refresh().await);
    assert_eq!(client.calls(), 1);

    client.release(1);
    assert!(leader.await.unwrap());
    assert_eq!(client.calls(), 1);
    assert!(!manager.is_refreshing());
    assert_eq!(manager.get_tokens().unwrap().access_token, "A2");
}

#[tokio::test]
async fn concurrent_waiters_share_one_refresh() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let (_store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh_or_wait().await })
        })
        .collect();
    wait_until(|| client.calls() == 1).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    client.release(1);

    let results = join_all(callers).await;
    assert!(results.into_iter().all(|r| r.unwrap()));
    assert_eq!(client.calls(), 1);
    assert_eq!(client.seen(), vec!["R1".to_string()]);
}

#[tokio::test]
async fn waiters_see_a_failed_refresh_as_false() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Status(401)));
    let (_store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let leader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh_or_wait().await }
    });
    wait_until(|| client.calls() == 1).await;
    let follower = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh_or_wait().await }
    });
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    client.release(1);

    assert!(!leader.await.unwrap());
    assert!(!follower.await.unwrap());
    assert_eq!(client.calls(), 1);
    assert!(manager.get_tokens().is_none());
}

#[tokio::test]
async fn non_success_status_clears_session() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(500)));
    let (store, manager) = memory_manager(client);
    manager.login(pair("A1", "R1", in_secs(1)));

    assert!(!manager.refresh().await);
    assert!(manager.get_tokens().is_none());
    assert!(store.get("auth").unwrap().is_none());
    assert_eq!(manager.phase(), SessionPhase::LoggedOut);
}

#[tokio::test]
async fn malformed_payload_clears_session() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (_store, manager) = memory_manager(client);
    manager.login(pair("A1", "R1", in_secs(1)));
    assert!(!manager.refresh().await);
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn successful_refresh_replaces_tokens() {
    let expires_at = in_secs(3600);
    let client = Arc::new(GatedRefreshClient::open(Outcome::Succeed(pair(
        "A2", "R2", expires_at,
    ))));
    let (store, manager) = memory_manager(client.clone());
    manager.login(pair("A1", "R1", in_secs(1)));

    assert!(manager.refresh().await);
    assert_eq!(manager.get_tokens(), Some(pair("A2", "R2", expires_at)));
    assert!(!manager.is_refreshing());
    assert_eq!(client.seen(), vec!["R1".to_string()]);

    let reloaded = support::manager(store, client);
    assert_eq!(reloaded.get_tokens().unwrap().access_token, "A2");
}

#[tokio::test]
async fn refresh_without_session_makes_no_call() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Malformed));
    let (_store, manager) = memory_manager(client.clone());

    assert!(!manager.refresh().await);
    assert_eq!(client.calls(), 0);
    assert!(!manager.is_refreshing());
}

#[tokio::test]
async fn logout_during_refresh_is_not_undone() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let (store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let leader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    wait_until(|| client.calls() == 1).await;
    manager.logout();
    client.release(1);

    assert!(!leader.await.unwrap());
    assert!(manager.get_tokens().is_none());
    assert!(store.get("auth").unwrap().is_none());
}

#[tokio::test]
async fn login_during_failed_refresh_is_kept() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Status(401)));
    let (_store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let leader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    wait_until(|| client.calls() == 1).await;
    manager.login(pair("B1", "S1", in_secs(600)));
    client.release(1);

    assert!(!leader.await.unwrap());
    assert_eq!(manager.get_tokens().unwrap().access_token, "B1");
}

#[tokio::test(start_paused = true)]
async fn timed_out_refresh_clears_session() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Malformed));
    let store = Arc::new(MemoryStore::new());
    let config = SessionConfig::builder()
        .refresh_timeout(Duration::from_secs(2))
        .build();
    let manager = SessionTokenManager::new(store, client.clone(), config);
    manager.login(pair("A1", "R1", in_secs(1)));

    assert!(!manager.refresh().await);
    assert_eq!(client.calls(), 1);
    assert!(manager.get_tokens().is_none());
    assert!(!manager.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn bounded_retry_retries_transient_failures_only() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(503)));
    let config = SessionConfig::builder().retry(RetryPolicy::bounded(3)).build();
    let manager = SessionTokenManager::new(Arc::new(MemoryStore::new()), client.clone(), config);
    manager.login(pair("A1", "R1", in_secs(1)));

    assert!(!manager.refresh().await);
    assert_eq!(client.calls(), 3);
    assert!(manager.get_tokens().is_none());

    client.set_outcome(Outcome::Status(401));
    manager.login(pair("A1", "R1", in_secs(1)));
    assert!(!manager.refresh().await);
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn bounded_retry_recovers_when_endpoint_comes_back() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(502)));
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(100),
        multiplier: 1.0,
    };
    let config = SessionConfig::builder().retry(policy).build();
    let manager = Arc::new(SessionTokenManager::new(
        Arc::new(MemoryStore::new()),
        client.clone(),
        config,
    ));
    manager.login(pair("A1", "R1", in_secs(1)));

    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    wait_until(|| client.calls() == 1).await;
    client.set_outcome(Outcome::Succeed(pair("A2", "R2", in_secs(3600))));

    assert!(task.await.unwrap());
    assert_eq!(client.calls(), 2);
    assert_eq!(manager.get_tokens().unwrap().access_token, "A2");
}

#[tokio::test]
async fn valid_access_token_refreshes_when_near_expiry() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let (_store, manager) = memory_manager(client.clone());

    assert!(matches!(
        manager.valid_access_token().await,
        Err(SessionError::NotLoggedIn)
    ));

    manager.login(pair("A1", "R1", in_secs(3600)));
    assert_eq!(manager.valid_access_token().await.unwrap(), "A1");
    assert_eq!(client.calls(), 0);

    manager.login(pair("A1", "R1", in_secs(10)));
    assert_eq!(manager.valid_access_token().await.unwrap(), "A2");
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn valid_access_token_reports_failed_refresh_as_logged_out() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(401)));
    let (_store, manager) = memory_manager(client);
    manager.login(pair("A1", "R1", in_secs(-5)));

    assert!(matches!(
        manager.valid_access_token().await,
        Err(SessionError::NotLoggedIn)
    ));
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn extreme_past_expiry_reads_as_expired() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(401)));
    let (_store, manager) = memory_manager(client.clone());
    manager.login(pair("A1", "R1", -9_300_000_000_000_000));
    assert_eq!(manager.get_tokens().unwrap().expires_at, i64::MIN);

    assert!(matches!(
        manager.valid_access_token().await,
        Err(SessionError::NotLoggedIn)
    ));
    assert_eq!(client.calls(), 1);
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn try_refresh_reports_the_failure_cause() {
    let client = Arc::new(GatedRefreshClient::open(Outcome::Status(500)));
    let (_store, manager) = memory_manager(client.clone());
    assert!(matches!(
        manager.try_refresh().await,
        Err(SessionError::NoRefreshToken)
    ));
    assert_eq!(client.calls(), 0);

    manager.login(pair("A1", "R1", in_secs(1)));
    assert!(matches!(
        manager.try_refresh().await,
        Err(SessionError::Api { status: 500, .. })
    ));
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn try_refresh_reports_a_superseded_result() {
    let client = Arc::new(GatedRefreshClient::new(Outcome::Succeed(pair(
        "A2",
        "R2",
        in_secs(3600),
    ))));
    let (_store, manager) = memory_manager(client.clone());
    let manager = Arc::new(manager);
    manager.login(pair("A1", "R1", in_secs(1)));

    let leader = tokio::spawn({
        let manager = manager.clone();
        async move { manager.try_refresh().await }
    });
    wait_until(|| client.calls() == 1).await;
    assert!(matches!(
        manager.try_refresh().await,
        Err(SessionError::RefreshInFlight)
    ));
    manager.login(pair("B1", "S1", in_secs(600)));
    client.release(1);

    assert!(matches!(leader.await.unwrap(), Err(SessionError::SessionChanged)));
    assert_eq!(manager.get_tokens().unwrap().access_token, "B1");
}
