//! Refresh endpoint collaborator.

pub mod http;

pub use http::HttpRefreshClient;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::session::TokenPair;

/// Exchanges a refresh token for a new [`TokenPair`].
///
/// Implementations report every failure as an error; the session manager
/// decides what a failure means for the session.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError>;
}
