//! Process-wide cache of parsed legacy configuration documents.
//!
//! Documents are keyed by absolute path and parsed once. Every read hands
//! out its own clone, so a caller mutating its copy never affects what
//! other callers see.

use crate::error::Result;
use crate::legacy::LegacyConfig;
use parking_lot::ReentrantMutex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Shared, thread-safe cache of validated documents.
///
/// The lock is re-entrant so a thread that already holds it (for example
/// while a load is in progress) can call back into the cache without
/// deadlocking. Entries are keyed by path alone, whichever schema loaded them.
#[derive(Default)]
pub struct ConfigCache {
    entries: ReentrantMutex<RefCell<HashMap<PathBuf, Value>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the document at `filename` (or `C`'s default path),
    /// loading and validating it first if it is not cached yet.
    pub fn load_from_cache<C: LegacyConfig>(&self, filename: Option<&Path>) -> Result<Value> {
        let path = match filename {
            Some(path) => std::path::absolute(path)?,
            None => std::path::absolute(C::default_path())?,
        };

        let entries = self.entries.lock();
        if let Some(cached) = entries.borrow().get(&path) {
            debug!(path = %path.display(), "Configuration cache hit");
            return Ok(cached.clone());
        }

        debug!(path = %path.display(), "Configuration cache miss");
        let parsed = C::load(Some(&path))?;
        entries.borrow_mut().insert(path, parsed.clone());
        Ok(parsed)
    }

    /// Evict one document, or every document when `filename` is `None`.
    pub fn flush_cache(&self, filename: Option<&Path>) -> Result<()> {
        let entries = self.entries.lock();
        match filename {
            Some(path) => {
                let path = std::path::absolute(path)?;
                if entries.borrow_mut().remove(&path).is_some() {
                    debug!(path = %path.display(), "Evicted cached configuration");
                }
            }
            None => {
                entries.borrow_mut().clear();
                debug!("Flushed configuration cache");
            }
        }
        Ok(())
    }

    pub fn contains(&self, filename: &Path) -> bool {
        match std::path::absolute(filename) {
            Ok(path) => self.entries.lock().borrow().contains_key(&path),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("entries", &self.len())
            .finish()
    }
}
