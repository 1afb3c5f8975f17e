//! Authenticated HTTP requests backed by a [`SessionTokenManager`].

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::session::SessionTokenManager;

/// HTTP client that attaches the session's bearer token to every request.
///
/// A `401 Unauthorized` triggers one refresh (joining any refresh already in
/// flight) and one retry with the new token.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use comiccoin_auth::http::AuthenticatedClient;
/// use comiccoin_auth::session::SessionTokenManager;
///
/// # async fn example(session: Arc<SessionTokenManager>) -> comiccoin_auth::error::Result<()> {
/// let http = AuthenticatedClient::new(reqwest::Client::new(), session);
/// let me: serde_json::Value = http.get_json("https://iam.example.com/api/v1/me").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    client: reqwest::Client,
    session: Arc<SessionTokenManager>,
}

impl AuthenticatedClient {
    pub fn new(client: reqwest::Client, session: Arc<SessionTokenManager>) -> Self {
        Self { client, session }
    }

    pub fn session(&self) -> &Arc<SessionTokenManager> {
        &self.session
    }

    /// Send the request produced by `build`, authenticating it.
    ///
    /// `build` may run twice, so it must be repeatable. Fails with
    /// [`SessionError::NotLoggedIn`] when there is no session, the refresh
    /// fails, or the retried request is rejected again.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response, SessionError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.session.valid_access_token().await?;
        let resp = build(&self.client).bearer_auth(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!(url = %resp.url(), "request rejected with 401; refreshing session");
        if !self.session.refresh_after_rejection(&token).await {
            return Err(SessionError::NotLoggedIn);
        }
        let token = self.session.valid_access_token().await?;
        let resp = build(&self.client).bearer_auth(&token).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %resp.url(), "request rejected again after refresh");
            return Err(SessionError::NotLoggedIn);
        }
        Ok(resp)
    }

    /// GET `url` and decode a JSON body; non-2xx statuses become [`SessionError::Api`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SessionError> {
        let resp = self.send(|client| client.get(url)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::api(status.as_u16(), body));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
