//! Persisted session record.

use serde::{Deserialize, Serialize};

use super::token::TokenPair;

/// JSON shape written under the session storage key.
///
/// ```json
/// {"tokens":{"accessToken":"..","refreshToken":"..","expiresAt":1700000000000},"isAuthenticated":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub tokens: Option<TokenPair>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl SessionRecord {
    pub fn from_tokens(tokens: Option<TokenPair>) -> Self {
        let is_authenticated = tokens.is_some();
        Self {
            tokens,
            is_authenticated,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored record into a usable pair.
    ///
    /// Corrupt JSON, a missing `tokens` field, an incomplete pair or a
    /// non-positive expiry all read as "no session"; the issue is reported for
    /// logging.
    pub fn decode(raw: &str) -> Result<Option<TokenPair>, DecodeIssue> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| DecodeIssue::Corrupt(e.to_string()))?;
        let Some(tokens) = value.get("tokens") else {
            return Err(DecodeIssue::MissingTokens);
        };
        if tokens.is_null() {
            return Ok(None);
        }
        let pair: TokenPair = serde_json::from_value(tokens.clone())
            .map_err(|e| DecodeIssue::Corrupt(e.to_string()))?;
        if !pair.is_complete() {
            return Err(DecodeIssue::Incomplete);
        }
        if pair.expires_at <= 0 {
            return Err(DecodeIssue::InvalidExpiry(pair.expires_at));
        }
        Ok(Some(pair.normalized()))
    }
}

/// Why a stored record was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeIssue {
    Corrupt(String),
    MissingTokens,
    Incomplete,
    InvalidExpiry(i64),
}

impl std::fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corrupt(reason) => write!(f, "corrupt session record: {reason}"),
            Self::MissingTokens => write!(f, "session record has no tokens field"),
            Self::Incomplete => write!(f, "session record holds an incomplete token pair"),
            Self::InvalidExpiry(at) => write!(f, "session record has invalid expiresAt {at}"),
        }
    }
}
