//! ComicCoin session tokens.
//!
//! Holds the access/refresh token pair for a ComicCoin client, persists it to
//! a key-value store, and refreshes it with single-flight semantics: however
//! many requests discover an expired token at once, one refresh call goes out.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use comiccoin_auth::prelude::*;
//!
//! # async fn example() -> comiccoin_auth::error::Result<()> {
//! let manager = Arc::new(SessionTokenManager::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpRefreshClient::new(RefreshEndpointConfig::new(
//!         "https://iam.example.com/api/v1/token/refresh",
//!     ))?),
//!     SessionConfig::default(),
//! ));
//! manager.login(TokenPair::new("access", "refresh", 1_700_000_000));
//! if !manager.refresh().await {
//!     println!("session ended");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod prelude;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
