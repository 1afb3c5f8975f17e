//! Durable key-value storage for persisted sessions.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StorageError;

/// Minimal string key-value store the session manager persists into.
///
/// Mirrors the browser local-storage surface: `get`, `set`, `remove`.
/// Removing a key that does not exist is not an error.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
