//! Storage repository traits
//!
//! The controller only needs a flat key-value namespace. Implementations
//! exist for SQLite (persistent) and memory (tests, throwaway runs).

use crate::error::Result;

/// Key-value store operations
///
/// Every call is a single round-trip. An absent key is `Ok(None)`, not an error.
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// Read many values at once
    ///
    /// Results are positional: `result[i]` belongs to `keys[i]`.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;
}
