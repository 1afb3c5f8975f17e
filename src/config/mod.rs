//! Configuration (layered: code > env > defaults).

use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;

use crate::error::SessionError;
use crate::storage::file::default_storage_dir;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_STORAGE_KEY: &str = "auth";
pub const LEGACY_STORAGE_KEY: &str = "auth-storage";
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

pub const ENV_REFRESH_URL: &str = "COMICCOIN_AUTH_REFRESH_URL";
pub const ENV_STORAGE_DIR: &str = "COMICCOIN_AUTH_STORAGE_DIR";
pub const ENV_STORAGE_KEY: &str = "COMICCOIN_AUTH_STORAGE_KEY";
pub const ENV_REFRESH_TIMEOUT_MS: &str = "COMICCOIN_AUTH_REFRESH_TIMEOUT_MS";
pub const ENV_REFRESH_THRESHOLD_SECS: &str = "COMICCOIN_AUTH_REFRESH_THRESHOLD_SECS";

/// Session manager settings.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use comiccoin_auth::config::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .storage_key("faucet-auth")
///     .refresh_timeout(Duration::from_secs(3))
///     .build();
/// assert_eq!(config.legacy_storage_keys, vec!["auth-storage".to_string()]);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    /// Storage key holding the persisted session record.
    #[builder(into, default = DEFAULT_STORAGE_KEY.to_string())]
    pub storage_key: String,
    /// Older keys removed alongside `storage_key` on logout.
    #[builder(default = vec![LEGACY_STORAGE_KEY.to_string()])]
    pub legacy_storage_keys: Vec<String>,
    /// Upper bound on a single refresh call; elapsing counts as a failed refresh.
    #[builder(default = DEFAULT_REFRESH_TIMEOUT)]
    pub refresh_timeout: Duration,
    /// How close to expiry an access token may get before it is refreshed proactively.
    #[builder(default = DEFAULT_REFRESH_THRESHOLD)]
    pub refresh_threshold: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    /// Load from environment variables (after reading `.env` if present).
    pub fn from_env() -> Result<Self, SessionError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let mut config = Self::default();
        if let Some(key) = lookup(ENV_STORAGE_KEY).filter(|v| !v.trim().is_empty()) {
            config.storage_key = key.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_REFRESH_TIMEOUT_MS) {
            config.refresh_timeout = Duration::from_millis(parse_u64(ENV_REFRESH_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_REFRESH_THRESHOLD_SECS) {
            config.refresh_threshold =
                Duration::from_secs(parse_u64(ENV_REFRESH_THRESHOLD_SECS, &raw)?);
        }
        Ok(config)
    }

    pub(crate) fn refresh_threshold_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_threshold).unwrap_or(chrono::Duration::MAX)
    }
}

/// Location and client settings for the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEndpointConfig {
    pub url: String,
    /// Request timeout enforced by the HTTP client itself.
    pub timeout: Duration,
}

impl RefreshEndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, SessionError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let url = lookup(ENV_REFRESH_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SessionError::Configuration(format!("{ENV_REFRESH_URL} is not set")))?;
        let mut config = Self::new(url);
        if let Some(raw) = lookup(ENV_REFRESH_TIMEOUT_MS) {
            config.timeout = Duration::from_millis(parse_u64(ENV_REFRESH_TIMEOUT_MS, &raw)?);
        }
        Ok(config)
    }
}

/// Storage directory from `COMICCOIN_AUTH_STORAGE_DIR`, else `~/.comiccoin`.
pub fn storage_dir_from_env() -> PathBuf {
    let _ = dotenvy::dotenv();
    std::env::var_os(ENV_STORAGE_DIR)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(default_storage_dir)
}

fn parse_u64(name: &str, raw: &str) -> Result<u64, SessionError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| SessionError::Configuration(format!("{name} must be an integer: {e}")))
}
