//! Session state: token pair, persisted record, and the token manager.

pub mod manager;
pub mod record;
pub mod token;

pub use manager::{SessionPhase, SessionState, SessionTokenManager};
pub use record::SessionRecord;
pub use token::TokenPair;
