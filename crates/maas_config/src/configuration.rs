//! Typed configuration façade.
//!
//! A configuration kind (see [`ConfigurationKind`]) declares a fixed set of
//! [`ConfigurationOption`]s, a backend, and where its file lives by default.
//! [`ConfigurationKind::open`] resolves the path, opens the backend and
//! hands the caller a [`Configuration`] bound to the open store.
//!
//! ```rust,ignore
//! use maas_config::{ClusterConfig, ConfigurationKind};
//!
//! ClusterConfig::open(None, |config| {
//!     config.set_tftp_port(5069)?;
//!     println!("{}", config.maas_url()?);
//!     Ok::<_, maas_config::ConfigError>(())
//! })?;
//! ```
//!
//! Kinds expose each option as a getter/setter pair, so a misspelt option
//! name does not compile. Name-based access through [`Configuration::set_raw`]
//! rejects anything that is not a declared option before the store is touched.

use crate::error::{ConfigError, Invalid, Result};
use crate::paths::{clear_default_path, ensure_parent_dir, resolve_path, set_default_path};
use crate::store::{Backend, Store};
use crate::validators::Validator;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A named, documented, validated option.
#[derive(Debug)]
pub struct ConfigurationOption<V> {
    pub name: &'static str,
    pub doc: &'static str,
    pub validator: V,
}

impl<V: Validator> ConfigurationOption<V> {
    pub const fn new(name: &'static str, doc: &'static str, validator: V) -> Self {
        Self {
            name,
            doc,
            validator,
        }
    }

    /// Read the option from `store`, falling back to the validator's default.
    pub fn get(&self, store: &dyn Store) -> Result<V::Output> {
        match store.get(self.name) {
            Ok(raw) => Ok(self
                .validator
                .to_typed(&raw)
                .map_err(|e| e.within(self.name))?),
            Err(ConfigError::KeyNotFound(_)) => Ok(self.validator.if_missing()),
            Err(e) => Err(e),
        }
    }

    /// Validate `value` and write it to `store`.
    pub fn set(&self, store: &mut dyn Store, value: &V::Output) -> Result<()> {
        let raw = self.validator.to_raw(value);
        self.validator
            .to_typed(&raw)
            .map_err(|e| e.within(self.name))?;
        store.set(self.name, raw)
    }

    /// Remove the option from `store`, so reads return the default again.
    pub fn delete(&self, store: &mut dyn Store) -> Result<()> {
        store.remove(self.name)
    }
}

/// Type-erased view of an option, for name-based access and listings.
pub trait OptionSpec: Sync {
    fn name(&self) -> &'static str;
    fn doc(&self) -> &'static str;
    /// Check that `raw` is acceptable for this option.
    fn check(&self, raw: &Value) -> std::result::Result<(), Invalid>;
    /// The default, in stored form.
    fn default_raw(&self) -> Value;
}

impl<V> OptionSpec for ConfigurationOption<V>
where
    V: Validator + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn doc(&self) -> &'static str {
        self.doc
    }

    fn check(&self, raw: &Value) -> std::result::Result<(), Invalid> {
        self.validator.to_typed(raw).map(|_| ())
    }

    fn default_raw(&self) -> Value {
        self.validator.to_raw(&self.validator.if_missing())
    }
}

/// A declared set of options bound to a backend and a default location.
pub trait ConfigurationKind: Sized {
    /// Name used in error messages.
    const NAME: &'static str;
    /// Environment variable that overrides the default path.
    const ENV_VAR: &'static str;
    /// Default path, relocated under `MAAS_ROOT` when that is set.
    const DEFAULT_PATH: &'static str;

    type Backend: Backend;

    fn options() -> &'static [&'static dyn OptionSpec];

    fn option(name: &str) -> Option<&'static dyn OptionSpec> {
        Self::options().iter().copied().find(|o| o.name() == name)
    }

    /// The file used when `open` is called without a path.
    fn default_path() -> PathBuf {
        resolve_path(None, Self::ENV_VAR, Self::DEFAULT_PATH)
    }

    /// Override the default path for this process and its children.
    fn set_default_path(path: &Path) {
        set_default_path(Self::ENV_VAR, path);
    }

    /// Drop any override of the default path.
    fn clear_default_path() {
        clear_default_path(Self::ENV_VAR);
    }

    /// Open the configuration at `path` (or the default path) and run `f`.
    ///
    /// Changes made by `f` are saved only if it returns `Ok`.
    fn open<R, E, F>(path: Option<&Path>, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Configuration<'_, Self>) -> std::result::Result<R, E>,
        E: From<ConfigError>,
    {
        let path = resolve_path(path, Self::ENV_VAR, Self::DEFAULT_PATH);
        ensure_parent_dir(&path)?;
        debug!(kind = Self::NAME, path = %path.display(), "Opening configuration");
        <Self::Backend as Backend>::open(&path, |store| {
            let mut config = Configuration::new(store);
            f(&mut config)
        })
    }
}

/// Options of kind `K` over an open store.
pub struct Configuration<'s, K> {
    store: &'s mut dyn Store,
    kind: PhantomData<K>,
}

impl<'s, K: ConfigurationKind> Configuration<'s, K> {
    pub fn new(store: &'s mut dyn Store) -> Self {
        Self {
            store,
            kind: PhantomData,
        }
    }

    pub fn get<V: Validator>(&self, option: &ConfigurationOption<V>) -> Result<V::Output> {
        option.get(&*self.store)
    }

    pub fn set<V: Validator>(
        &mut self,
        option: &ConfigurationOption<V>,
        value: &V::Output,
    ) -> Result<()> {
        option.set(&mut *self.store, value)
    }

    pub fn delete<V: Validator>(&mut self, option: &ConfigurationOption<V>) -> Result<()> {
        option.delete(&mut *self.store)
    }

    /// Options declared by this kind.
    pub fn options(&self) -> &'static [&'static dyn OptionSpec] {
        K::options()
    }

    /// Read an option by name in stored form, or its default if unset.
    pub fn get_raw(&self, name: &str) -> Result<Value> {
        let option = Self::lookup(name)?;
        match self.store.get(name) {
            Err(ConfigError::KeyNotFound(_)) => Ok(option.default_raw()),
            other => other,
        }
    }

    /// Validate and store an option by name.
    pub fn set_raw(&mut self, name: &str, raw: Value) -> Result<()> {
        let option = Self::lookup(name)?;
        option.check(&raw).map_err(|e| e.within(name))?;
        self.store.set(name, raw)
    }

    /// Remove an option by name.
    pub fn delete_raw(&mut self, name: &str) -> Result<()> {
        Self::lookup(name)?;
        self.store.remove(name)
    }

    fn lookup(name: &str) -> Result<&'static dyn OptionSpec> {
        K::option(name).ok_or_else(|| ConfigError::UnknownOption {
            kind: K::NAME,
            name: name.to_string(),
        })
    }
}
