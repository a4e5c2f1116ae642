//! Configuration store for MAAS cluster controllers.
//!
//! Settings live either in a YAML file guarded by an exclusive file lock,
//! or in an SQLite database. Callers never touch the storage directly: they
//! open a configuration kind and read or write its declared options.
//!
//! # Usage
//!
//! ```rust,ignore
//! use maas_config::{ClusterConfig, ConfigError, ConfigurationKind};
//!
//! // Uses $MAAS_CLUSTER_CONFIG, falling back to /etc/maas/cluster.conf.
//! ClusterConfig::open(None, |config| {
//!     config.set_maas_url("http://region.example.com:5240/MAAS")?;
//!     let port = config.tftp_port()?;
//!     Ok::<_, ConfigError>(port)
//! })?;
//!
//! // Whole-document settings, parsed once per process.
//! let cache = maas_config::ConfigCache::new();
//! let pserv = cache.load_from_cache::<maas_config::ProvisioningConfig>(None)?;
//! ```

mod error;

pub mod cache;
pub mod cluster;
pub mod configuration;
pub mod database;
pub mod file_store;
pub mod legacy;
pub mod lock;
pub mod paths;
pub mod schema;
pub mod store;
pub mod validators;

pub use cache::ConfigCache;
pub use cluster::{ClusterConfig, ClusterConfiguration};
pub use configuration::{Configuration, ConfigurationKind, ConfigurationOption, OptionSpec};
pub use database::{ConfigurationDatabase, DatabaseBackend};
pub use error::{ConfigError, Invalid, Result};
pub use file_store::{ConfigurationFile, FileBackend};
pub use legacy::{
    BootSource, BootSourceSelection, BootSources, LegacyConfig, ProvisioningConfig,
    BOOT_RESOURCES_STORAGE,
};
pub use lock::LOCK_TIMEOUT;
pub use store::{Backend, Store};
pub use validators::{Directory, ExtendedUrl, Int, UnicodeString, Validator};
