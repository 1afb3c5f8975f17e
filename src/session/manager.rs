use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use strum::Display;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::record::SessionRecord;
use super::token::TokenPair;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::refresh::RefreshClient;
use crate::storage::KeyValueStore;
use crate::util::timeout::with_timeout;

/// Coarse lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    LoggedOut,
    LoggedIn,
    Refreshing,
}

/// Point-in-time snapshot of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub tokens: Option<TokenPair>,
    pub is_authenticated: bool,
    pub is_refreshing: bool,
}

/// Owns the current token pair, persists it, and serializes refreshes.
///
/// At most one refresh call reaches the [`RefreshClient`] at a time. Callers
/// that arrive while one is in flight either get `false` straight away
/// ([`refresh`](Self::refresh)) or wait for the in-flight outcome
/// ([`refresh_or_wait`](Self::refresh_or_wait)).
///
/// A failed refresh always logs the session out.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use comiccoin_auth::config::{RefreshEndpointConfig, SessionConfig};
/// use comiccoin_auth::refresh::HttpRefreshClient;
/// use comiccoin_auth::session::SessionTokenManager;
/// use comiccoin_auth::storage::FileStore;
///
/// # async fn example() -> comiccoin_auth::error::Result<()> {
/// let client = HttpRefreshClient::new(RefreshEndpointConfig::from_env()?)?;
/// let manager = SessionTokenManager::new(
///     Arc::new(FileStore::new_default()),
///     Arc::new(client),
///     SessionConfig::from_env()?,
/// );
/// let bearer = manager.valid_access_token().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionTokenManager {
    store: Arc<dyn KeyValueStore>,
    client: Arc<dyn RefreshClient>,
    config: SessionConfig,
    tokens: RwLock<Option<TokenPair>>,
    /// Bumped on every login/clear/replace, under the `tokens` write lock.
    epoch: AtomicU64,
    /// Outcome channel of the refresh currently in flight, if any.
    in_flight: Mutex<Option<watch::Receiver<Option<bool>>>>,
}

impl fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenManager")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .field("store", &"..")
            .field("client", &"..")
            .finish()
    }
}

impl SessionTokenManager {
    /// Create a manager and hydrate it from `store`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn RefreshClient>,
        config: SessionConfig,
    ) -> Self {
        let tokens = hydrate(store.as_ref(), &config.storage_key);
        debug!(
            storage_key = %config.storage_key,
            authenticated = tokens.is_some(),
            "session manager initialized"
        );
        Self {
            store,
            client,
            config,
            tokens: RwLock::new(tokens),
            epoch: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current in-memory pair. Touches neither storage nor network.
    pub fn get_tokens(&self) -> Option<TokenPair> {
        self.read_tokens().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_tokens().is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.is_authenticated() {
            SessionPhase::LoggedOut
        } else if self.is_refreshing() {
            SessionPhase::Refreshing
        } else {
            SessionPhase::LoggedIn
        }
    }

    pub fn state(&self) -> SessionState {
        let tokens = self.get_tokens();
        SessionState {
            is_authenticated: tokens.is_some(),
            tokens,
            is_refreshing: self.is_refreshing(),
        }
    }

    /// Replace the session, persisting it. `None` or an incomplete pair clears.
    ///
    /// Second-resolution expiries are stored as millis. Storage failures are
    /// logged; the in-memory state still changes.
    pub fn set_tokens(&self, pair: Option<TokenPair>) {
        let pair = match pair {
            None => return self.clear_tokens(),
            Some(pair) if !pair.is_complete() => {
                warn!("refusing to store an incomplete token pair; clearing session");
                return self.clear_tokens();
            }
            Some(pair) => pair.normalized(),
        };
        let mut tokens = self.write_tokens();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // persist under the lock so storage order matches memory order
        self.persist(&pair);
        debug!(token = %pair.fingerprint(), expires_at = pair.expires_at, "session tokens set");
        *tokens = Some(pair);
    }

    /// Drop the session and remove every persisted record of it. Idempotent.
    pub fn clear_tokens(&self) {
        let mut tokens = self.write_tokens();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *tokens = None;
        self.remove_persisted();
        debug!("session tokens cleared");
    }

    pub fn login(&self, pair: TokenPair) {
        self.set_tokens(Some(pair));
    }

    pub fn logout(&self) {
        self.clear_tokens();
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Returns `false` without any network call when a refresh is already in
    /// flight. Returns `false` and clears the session when there is no refresh
    /// token or the exchange fails for any reason.
    pub async fn refresh(&self) -> bool {
        self.try_refresh().await.is_ok()
    }

    /// [`refresh`](Self::refresh), reporting why it did not succeed.
    ///
    /// Errors with [`SessionError::RefreshInFlight`] while another refresh is
    /// running and [`SessionError::NoRefreshToken`] when logged out; any other
    /// error is the cause of a failed exchange, after which the session is
    /// cleared.
    pub async fn try_refresh(&self) -> Result<(), SessionError> {
        match self.begin_refresh() {
            Ticket::Follower(_) => {
                debug!("refresh already in flight; not starting another");
                Err(SessionError::RefreshInFlight)
            }
            Ticket::Leader(guard) => self.lead_refresh(guard).await,
        }
    }

    /// Like [`refresh`](Self::refresh), but joins an in-flight refresh and
    /// returns its outcome instead of `false`.
    pub async fn refresh_or_wait(&self) -> bool {
        match self.begin_refresh() {
            Ticket::Follower(mut outcome) => {
                debug!("joining in-flight refresh");
                match outcome.wait_for(Option::is_some).await {
                    Ok(result) => (*result).unwrap_or(false),
                    // leader was cancelled before deciding
                    Err(_) => false,
                }
            }
            Ticket::Leader(guard) => self.lead_refresh(guard).await.is_ok(),
        }
    }

    /// Recover from the server rejecting `rejected_access_token`.
    ///
    /// If the session already moved past that token, nothing is refreshed.
    pub async fn refresh_after_rejection(&self, rejected_access_token: &str) -> bool {
        let rotated = self
            .read_tokens()
            .as_ref()
            .is_some_and(|pair| pair.access_token != rejected_access_token);
        if rotated {
            return true;
        }
        self.refresh_or_wait().await
    }

    /// Access token to attach to an outgoing request.
    ///
    /// Refreshes first (joining any in-flight refresh) when the token expires
    /// within the configured threshold.
    pub async fn valid_access_token(&self) -> Result<String, SessionError> {
        let needs_refresh = match self.read_tokens().as_ref() {
            None => return Err(SessionError::NotLoggedIn),
            Some(pair) => pair.expires_within(self.config.refresh_threshold_chrono(), Utc::now()),
        };
        if needs_refresh && !self.refresh_or_wait().await {
            debug!("proactive refresh did not succeed");
        }
        match self.get_tokens() {
            Some(pair) if !pair.is_expired() => Ok(pair.access_token),
            _ => Err(SessionError::NotLoggedIn),
        }
    }

    fn begin_refresh(&self) -> Ticket<'_> {
        let mut slot = self.lock_in_flight();
        if let Some(outcome) = slot.as_ref() {
            return Ticket::Follower(outcome.clone());
        }
        let (tx, rx) = watch::channel(None);
        *slot = Some(rx);
        Ticket::Leader(InFlightGuard {
            slot: &self.in_flight,
            tx,
            outcome: None,
        })
    }

    async fn lead_refresh(&self, mut guard: InFlightGuard<'_>) -> Result<(), SessionError> {
        let refresh_id = Uuid::new_v4();
        let (refresh_token, epoch) = {
            let tokens = self.read_tokens();
            (
                tokens.as_ref().map(|pair| pair.refresh_token.clone()),
                self.epoch.load(Ordering::SeqCst),
            )
        };

        let Some(refresh_token) = refresh_token else {
            debug!(%refresh_id, "no refresh token; clearing session");
            self.clear_tokens();
            return guard.finish(Err(SessionError::NoRefreshToken));
        };

        debug!(%refresh_id, "refreshing session tokens");
        let client = &self.client;
        let token = refresh_token.as_str();
        let timeout = self.config.refresh_timeout;
        let result = self
            .config
            .retry
            .execute(move || with_timeout(timeout, client.refresh(token)))
            .await
            .and_then(|pair| {
                if pair.is_complete() {
                    Ok(pair.normalized())
                } else {
                    Err(SessionError::MalformedPayload(
                        "incomplete token pair".to_string(),
                    ))
                }
            });

        let outcome = match result {
            Ok(pair) => {
                let fingerprint = pair.fingerprint();
                if self.replace_if_current(epoch, pair) {
                    info!(%refresh_id, token = %fingerprint, "session tokens refreshed");
                    Ok(())
                } else {
                    debug!(%refresh_id, "session changed during refresh; discarding result");
                    Err(SessionError::SessionChanged)
                }
            }
            Err(err) => {
                warn!(%refresh_id, error = %err, "refresh failed; clearing session");
                self.clear_if_current(epoch);
                Err(err)
            }
        };
        guard.finish(outcome)
    }

    fn replace_if_current(&self, epoch: u64, pair: TokenPair) -> bool {
        let mut tokens = self.write_tokens();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist(&pair);
        *tokens = Some(pair);
        true
    }

    fn clear_if_current(&self, epoch: u64) {
        let mut tokens = self.write_tokens();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session changed during failed refresh; leaving it in place");
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *tokens = None;
        self.remove_persisted();
    }

    fn persist(&self, pair: &TokenPair) {
        let record = SessionRecord::from_tokens(Some(pair.clone()));
        let serialized = match record.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize session record");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.config.storage_key, &serialized) {
            warn!(
                storage_key = %self.config.storage_key,
                error = %err,
                "failed to persist session; continuing in memory"
            );
        }
    }

    fn remove_persisted(&self) {
        let keys = std::iter::once(&self.config.storage_key).chain(&self.config.legacy_storage_keys);
        for key in keys {
            if let Err(err) = self.store.remove(key) {
                warn!(storage_key = %key, error = %err, "failed to remove persisted session");
            }
        }
    }

    fn read_tokens(&self) -> RwLockReadGuard<'_, Option<TokenPair>> {
        self.tokens.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tokens(&self) -> RwLockWriteGuard<'_, Option<TokenPair>> {
        self.tokens.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<watch::Receiver<Option<bool>>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Ticket<'a> {
    Leader(InFlightGuard<'a>),
    Follower(watch::Receiver<Option<bool>>),
}

/// Holds the single-flight slot; releases it and publishes the outcome on drop.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<watch::Receiver<Option<bool>>>>,
    tx: watch::Sender<Option<bool>>,
    outcome: Option<bool>,
}

impl InFlightGuard<'_> {
    fn finish(&mut self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        self.outcome = Some(result.is_ok());
        result
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        if let Some(outcome) = self.outcome {
            let _ = self.tx.send(Some(outcome));
        }
    }
}

fn hydrate(store: &dyn KeyValueStore, key: &str) -> Option<TokenPair> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(storage_key = %key, error = %err, "failed to read persisted session");
            return None;
        }
    };
    match SessionRecord::decode(&raw) {
        Ok(tokens) => tokens,
        Err(issue) => {
            warn!(storage_key = %key, %issue, "discarding persisted session");
            None
        }
    }
}
