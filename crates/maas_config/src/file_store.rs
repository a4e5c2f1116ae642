//! YAML file backend.
//!
//! The whole configuration is one YAML mapping. Opening a file takes an
//! exclusive lock (see [`crate::lock`]) so there is only one reader or
//! writer at a time; hold it for as short a time as possible.

use crate::error::{ConfigError, Invalid, Result};
use crate::lock;
use crate::paths::{atomic_write, touch};
use crate::store::{Backend, Store};
use serde_json::{Map, Value};
use serde_yaml::{Mapping, Value as Yaml};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-memory copy of a YAML configuration file.
///
/// The document is held as YAML so entries this crate never touches are
/// written back exactly as they were loaded, whatever their keys or values.
#[derive(Debug)]
pub struct ConfigurationFile {
    path: PathBuf,
    config: Mapping,
    dirty: bool,
}

impl ConfigurationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Mapping::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the in-memory mapping with the file's contents.
    ///
    /// An empty document loads as an empty mapping. Anything other than a
    /// mapping at the top level is a [`ConfigError::Format`].
    pub fn load(&mut self) -> Result<()> {
        let text = fs::read_to_string(&self.path)?;
        let doc: Yaml = if text.trim().is_empty() {
            Yaml::Null
        } else {
            serde_yaml::from_str(&text)?
        };
        match doc {
            Yaml::Null => {
                self.config.clear();
            }
            Yaml::Mapping(mapping) => {
                self.config = mapping;
            }
            other => {
                let value = serde_yaml::to_string(&other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_else(|_| format!("{:?}", other));
                return Err(ConfigError::Format {
                    path: self.path.clone(),
                    value,
                });
            }
        }
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.config.len(), "Loaded configuration file");
        Ok(())
    }

    /// Write the mapping back, replacing the file atomically.
    pub fn save(&mut self) -> Result<()> {
        let dump = serde_yaml::to_string(&self.config)?;
        atomic_write(&self.path, dump.as_bytes())?;
        self.dirty = false;
        info!(path = %self.path.display(), "Saved configuration file");
        Ok(())
    }
}

impl Store for ConfigurationFile {
    fn get(&self, name: &str) -> Result<Value> {
        let value = self
            .config
            .get(name)
            .ok_or_else(|| ConfigError::key_not_found(name))?;
        yaml_to_json(value).map_err(|e| ConfigError::from(e.within(name)))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let value = serde_yaml::to_value(&value)?;
        self.config.insert(Yaml::String(name.to_string()), value);
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        if self.config.shift_remove(name).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    /// Names of string-keyed entries. Other keys are kept but not listed.
    fn names(&self) -> Result<Vec<String>> {
        Ok(self
            .config
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect())
    }
}

/// Convert a stored YAML value to its raw JSON form.
///
/// Fails rather than approximating: non-finite floats, non-string mapping
/// keys and tagged values have no JSON equivalent.
fn yaml_to_json(value: &Yaml) -> std::result::Result<Value, Invalid> {
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        Invalid::new(format!("The stored number {} cannot be represented", n))
                    })?
            }
        }
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(
            items
                .iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, item) in mapping {
                let key = key.as_str().ok_or_else(|| {
                    Invalid::new(format!("The mapping key {:?} is not a string", key))
                })?;
                out.insert(key.to_string(), yaml_to_json(item).map_err(|e| e.within(key))?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => {
            return Err(Invalid::new(format!(
                "Tagged values ({}) are not supported",
                tagged.tag
            )))
        }
    })
}

/// Backend storing configuration as YAML in a single file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl Backend for FileBackend {
    type Store = ConfigurationFile;

    fn open<R, E, F>(path: &Path, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self::Store) -> std::result::Result<R, E>,
        E: From<ConfigError>,
    {
        let _guard = lock::lock_exclusive(path)?;
        touch(path)?;
        let mut file = ConfigurationFile::new(path);
        file.load()?;
        let result = f(&mut file)?;
        if file.is_dirty() {
            file.save()?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open<R>(
        path: &Path,
        f: impl FnOnce(&mut ConfigurationFile) -> Result<R>,
    ) -> Result<R> {
        FileBackend::open(path, f)
    }

    #[test]
    fn test_open_creates_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");

        let names = open(&path, |store| {
            assert!(!store.is_dirty());
            store.names()
        })
        .unwrap();

        assert!(names.is_empty());
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_mutations_persist_across_opens() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");

        open(&path, |store| {
            store.set("alice", json!(1))?;
            store.set("bob", json!({"nested": [1, 2]}))
        })
        .unwrap();

        open(&path, |store| {
            assert_eq!(store.get("alice")?, json!(1));
            assert_eq!(store.get("bob")?, json!({"nested": [1, 2]}));
            store.remove("alice")
        })
        .unwrap();

        let names = open(&path, |store| store.names()).unwrap();
        assert_eq!(names, vec!["bob".to_string()]);
    }

    #[test]
    fn test_get_missing_is_key_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");

        let err = open(&path, |store| store.get("nope")).unwrap_err();
        assert!(err.is_key_not_found());
    }

    #[test]
    fn test_dirty_tracking() {
        let tmp = TempDir::new().unwrap();
        let mut file = ConfigurationFile::new(tmp.path().join("c.yaml"));

        file.remove("absent").unwrap();
        assert!(!file.is_dirty());

        file.set("a", json!(1)).unwrap();
        assert!(file.is_dirty());
        file.save().unwrap();
        assert!(!file.is_dirty());

        file.remove("a").unwrap();
        assert!(file.is_dirty());
    }

    #[test]
    fn test_clean_exit_without_changes_does_not_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "# hand edited\nalice: 1\n").unwrap();

        open(&path, |store| store.get("alice")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "# hand edited\nalice: 1\n");
    }

    #[test]
    fn test_error_in_block_discards_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");

        let result: Result<()> = open(&path, |store| {
            store.set("alice", json!(1))?;
            Err(ConfigError::invalid("boom"))
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let names = open(&path, |store| store.names()).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_scalar_document_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "hello\n").unwrap();

        let err = open(&path, |store| store.names()).unwrap_err();
        match err {
            ConfigError::Format { path: p, value } => {
                assert_eq!(p, path);
                assert_eq!(value, "hello");
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_unrepresentable_values_survive_unrelated_writes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "ratio: .inf\nmissing: .nan\n").unwrap();

        let err = open(&path, |store| store.get("ratio")).unwrap_err();
        match err {
            ConfigError::Invalid(invalid) => {
                assert_eq!(invalid.field, "ratio");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }

        open(&path, |store| store.set("tftp_port", json!(5))).unwrap();

        let on_disk: Yaml = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["ratio"].as_f64(), Some(f64::INFINITY));
        assert!(on_disk["missing"].as_f64().is_some_and(f64::is_nan));
        assert_eq!(on_disk["tftp_port"].as_i64(), Some(5));
    }

    #[test]
    fn test_non_string_keys_are_kept() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "tftp_port: 1069\n1: legacy\n").unwrap();

        let (port, names) = open(&path, |store| Ok((store.get("tftp_port")?, store.names()?))).unwrap();
        assert_eq!(port, json!(1069));
        assert_eq!(names, vec!["tftp_port".to_string()]);

        open(&path, |store| store.set("tftp_port", json!(2069))).unwrap();

        let on_disk: Yaml = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk[1].as_str(), Some("legacy"));
        assert_eq!(on_disk["tftp_port"].as_i64(), Some(2069));
    }

    #[test]
    fn test_nested_values_convert_to_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "boot:\n  ephemeral: [a, b]\n  ratio: 0.5\nodd:\n  2: x\n").unwrap();

        let boot = open(&path, |store| store.get("boot")).unwrap();
        assert_eq!(boot, json!({"ephemeral": ["a", "b"], "ratio": 0.5}));

        let err = open(&path, |store| store.get("odd")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_lock_released_after_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "- not\n- a mapping\n").unwrap();

        assert!(open(&path, |store| store.names()).is_err());

        // Nothing is left holding the lock.
        let guard = lock::lock_exclusive_timeout(&path, std::time::Duration::from_millis(100));
        assert!(guard.is_ok());
    }
}
