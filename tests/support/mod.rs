#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use comiccoin_auth::config::SessionConfig;
use comiccoin_auth::error::{SessionError, StorageError};
use comiccoin_auth::refresh::RefreshClient;
use comiccoin_auth::session::{SessionTokenManager, TokenPair};
use comiccoin_auth::storage::{KeyValueStore, MemoryStore};
use tokio::sync::Semaphore;

/// Store whose every operation fails, as a full or read-only disk would.
#[derive(Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("read failed".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("write failed".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("remove failed".to_string()))
    }
}

#[derive(Clone)]
pub enum Outcome {
    Succeed(TokenPair),
    Status(u16),
    Malformed,
}

/// Refresh client that blocks each call until the test releases it.
pub struct GatedRefreshClient {
    gate: Semaphore,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    outcome: Mutex<Outcome>,
}

impl GatedRefreshClient {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            outcome: Mutex::new(outcome),
        }
    }

    /// Client whose calls complete immediately.
    pub fn open(outcome: Outcome) -> Self {
        let client = Self::new(outcome);
        client.release(1_000);
        client
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("seen lock poisoned").clone()
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock().expect("outcome lock poisoned") = outcome;
    }
}

#[async_trait]
impl RefreshClient for GatedRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("seen lock poisoned")
            .push(refresh_token.to_string());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SessionError::Configuration("gate closed".to_string()))?;
        permit.forget();
        let outcome = self.outcome.lock().expect("outcome lock poisoned").clone();
        match outcome {
            Outcome::Succeed(pair) => Ok(pair),
            Outcome::Status(status) => Err(SessionError::api(status, "refresh rejected")),
            Outcome::Malformed => Err(SessionError::MalformedPayload("empty response body".into())),
        }
    }
}

pub fn pair(access: &str, refresh: &str, expires_at: i64) -> TokenPair {
    TokenPair::new(access, refresh, expires_at)
}

/// Epoch millis `secs` seconds from now.
pub fn in_secs(secs: i64) -> i64 {
    Utc::now().timestamp_millis() + secs * 1000
}

pub fn manager(
    store: Arc<dyn KeyValueStore>,
    client: Arc<dyn RefreshClient>,
) -> SessionTokenManager {
    SessionTokenManager::new(store, client, SessionConfig::default())
}

pub fn memory_manager(client: Arc<GatedRefreshClient>) -> (Arc<MemoryStore>, SessionTokenManager) {
    let store = Arc::new(MemoryStore::new());
    let manager = manager(store.clone(), client);
    (store, manager)
}

/// Yield until `condition` holds; panics after many polls.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
