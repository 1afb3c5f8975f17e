use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RefreshClient;
use crate::config::RefreshEndpointConfig;
use crate::error::SessionError;
use crate::session::token::{normalize_expires_at, TokenPair};

/// Refresh client that POSTs `{"refresh_token": ..}` as JSON.
///
/// # Example
/// ```no_run
/// use comiccoin_auth::config::RefreshEndpointConfig;
/// use comiccoin_auth::refresh::HttpRefreshClient;
///
/// let client = HttpRefreshClient::new(RefreshEndpointConfig::new(
///     "https://iam.example.com/api/v1/token/refresh",
/// ))?;
/// # Ok::<(), comiccoin_auth::error::SessionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HttpRefreshClient {
    client: reqwest::Client,
    url: String,
}

impl HttpRefreshClient {
    /// Fails with [`SessionError::Configuration`] if the URL does not parse, so
    /// a typo never reaches [`RefreshClient::refresh`] and logs a session out.
    pub fn new(config: RefreshEndpointConfig) -> Result<Self, SessionError> {
        reqwest::Url::parse(&config.url).map_err(|e| {
            SessionError::Configuration(format!("invalid refresh URL {:?}: {e}", config.url))
        })?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url,
        })
    }

    /// Use an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RefreshClient for HttpRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let resp = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SessionError::api(status.as_u16(), extract_error_message(&body)));
        }
        parse_refresh_body(&body)
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<serde_json::Value>,
}

/// Parse a successful refresh response body into a normalized pair.
pub(crate) fn parse_refresh_body(body: &str) -> Result<TokenPair, SessionError> {
    if body.trim().is_empty() {
        return Err(SessionError::MalformedPayload("empty response body".to_string()));
    }
    let payload: RefreshResponse = serde_json::from_str(body)
        .map_err(|e| SessionError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let access_token = required(payload.access_token, "access_token")?;
    let refresh_token = required(payload.refresh_token, "refresh_token")?;
    let expires_at = payload
        .expires_at
        .ok_or_else(|| SessionError::MalformedPayload("missing expires_at".to_string()))
        .and_then(parse_expires_at)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        expires_at,
    })
}

fn required(value: Option<String>, field: &str) -> Result<String, SessionError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SessionError::MalformedPayload(format!("missing {field}")))
}

fn parse_expires_at(value: serde_json::Value) -> Result<i64, SessionError> {
    let raw = if let Some(num) = value.as_i64() {
        num
    } else if let Some(text) = value.as_str() {
        text.trim().parse().map_err(|_| {
            SessionError::MalformedPayload(format!("expires_at is not an integer: {text}"))
        })?
    } else {
        return Err(SessionError::MalformedPayload(format!(
            "expires_at has unexpected type: {value}"
        )));
    };
    if raw <= 0 {
        return Err(SessionError::MalformedPayload(format!(
            "expires_at must be positive: {raw}"
        )));
    }
    Ok(normalize_expires_at(raw))
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message", "detail"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|e| e.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}
