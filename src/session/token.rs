use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Instants below this are read as seconds since epoch rather than millis.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Access/refresh credential pair with the access token's absolute expiry.
///
/// `expires_at` is epoch milliseconds once the pair has passed through
/// [`TokenPair::normalized`].
///
/// # Example
/// ```
/// use comiccoin_auth::session::TokenPair;
///
/// let pair = TokenPair::new("access", "refresh", 1_700_000_000).normalized();
/// assert_eq!(pair.expires_at, 1_700_000_000_000);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Both credentials are present. Incomplete pairs are never held or persisted.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// Copy with `expires_at` converted to epoch millis.
    pub fn normalized(mut self) -> Self {
        self.expires_at = normalize_expires_at(self.expires_at);
        self
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp_millis()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expires within `threshold` of `now` (or already has).
    pub fn expires_within(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.saturating_sub(now.timestamp_millis()) < threshold.num_milliseconds()
    }

    /// Short stable identifier for logs; never the token itself.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.access_token)
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = format!("<{}>", fingerprint(&self.access_token));
        let refresh = format!("<{}>", fingerprint(&self.refresh_token));
        f.debug_struct("TokenPair")
            .field("access_token", &access)
            .field("refresh_token", &refresh)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Convert an epoch instant to millis, treating values below
/// [`MILLIS_THRESHOLD`] as seconds.
pub fn normalize_expires_at(raw: i64) -> i64 {
    if raw < MILLIS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

pub(crate) fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
