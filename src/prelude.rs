//! Convenience re-exports for common use.

pub use crate::config::{RefreshEndpointConfig, SessionConfig};
pub use crate::error::{Result, SessionError};
pub use crate::http::AuthenticatedClient;
pub use crate::refresh::{HttpRefreshClient, RefreshClient};
pub use crate::session::{SessionPhase, SessionState, SessionTokenManager, TokenPair};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
pub use crate::util::retry::RetryPolicy;
