//! Backend abstraction.
//!
//! A [`Backend`] opens a path for the duration of a closure and hands it a
//! [`Store`]: a mutable name → raw value mapping. Whatever happens inside
//! the closure, the backend releases its lock or connection on the way out,
//! and it only persists changes when the closure returns `Ok`.

use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::path::Path;

/// Dict-like access to stored configuration.
pub trait Store {
    /// Fetch a raw value. Fails with [`ConfigError::KeyNotFound`] if absent.
    fn get(&self, name: &str) -> Result<Value>;

    /// Create or overwrite an entry.
    fn set(&mut self, name: &str, value: Value) -> Result<()>;

    /// Remove an entry. Removing an absent name is a no-op.
    fn remove(&mut self, name: &str) -> Result<()>;

    /// All stored names. Order is unspecified.
    fn names(&self) -> Result<Vec<String>>;
}

/// A storage mechanism with scoped acquisition.
pub trait Backend {
    type Store: Store + 'static;

    /// Open `path`, run `f` against the store, then commit or discard.
    ///
    /// Changes are persisted only if `f` returns `Ok`. The error from `f`
    /// is returned unchanged.
    fn open<R, E, F>(path: &Path, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self::Store) -> std::result::Result<R, E>,
        E: From<ConfigError>;
}
