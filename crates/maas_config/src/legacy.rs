//! Whole-document YAML configuration (`pserv.yaml`, `sources.yaml`).
//!
//! These files predate the per-option [`crate::configuration`] API. A
//! document is parsed as YAML, validated against a [`Field`] tree and
//! returned as a plain JSON value with every default filled in. For
//! repeated reads in a long-running process use [`crate::cache::ConfigCache`].

use crate::error::Result;
use crate::paths::{atomic_write, clear_default_path, resolve_path, set_default_path};
use crate::schema::{field_at, Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory on the cluster controller where boot resources are stored.
pub const BOOT_RESOURCES_STORAGE: &str = "/var/lib/maas/boot-resources/";

/// A schema-validated YAML document with a default location.
pub trait LegacyConfig {
    /// Environment variable that overrides the default path.
    const ENV_VAR: &'static str;
    /// File name under `/etc/maas` used when the variable is unset.
    const DEFAULT_NAME: &'static str;

    /// Root validator for the whole document.
    fn schema() -> Field;

    fn default_path() -> PathBuf {
        resolve_path(
            None,
            Self::ENV_VAR,
            &format!("/etc/maas/{}", Self::DEFAULT_NAME),
        )
    }

    fn set_default_path(path: &Path) {
        set_default_path(Self::ENV_VAR, path);
    }

    fn clear_default_path() {
        clear_default_path(Self::ENV_VAR);
    }

    /// Parse YAML text and validate it.
    fn parse(text: &str) -> Result<Value> {
        let raw: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(text)?
        };
        Ok(Self::schema().validate(Some(&raw))?)
    }

    /// Load and validate `path`, or the default file.
    fn load(path: Option<&Path>) -> Result<Value> {
        let path = resolve(path, Self::default_path);
        let text = fs::read_to_string(&path)?;
        Self::parse(&text)
    }

    /// Write `config` as YAML, replacing the file atomically.
    fn save(config: &Value, path: Option<&Path>) -> Result<()> {
        let path = resolve(path, Self::default_path);
        let dump = serde_yaml::to_string(config)?;
        atomic_write(&path, dump.as_bytes())?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Where `create_backup` puts a copy: `<path>.<message>.bak`.
    fn backup_path(message: &str, path: Option<&Path>) -> PathBuf {
        let path = resolve(path, Self::default_path);
        let mut name = path.into_os_string();
        name.push(format!(".{}.bak", message));
        PathBuf::from(name)
    }

    /// Copy the current file aside, e.g. before an upgrade rewrites it.
    fn create_backup(message: &str, path: Option<&Path>) -> Result<PathBuf> {
        let source = resolve(path, Self::default_path);
        let backup = Self::backup_path(message, Some(&source));
        fs::copy(&source, &backup)?;
        info!(from = %source.display(), to = %backup.display(), "Created configuration backup");
        Ok(backup)
    }

    /// The configuration an empty file would produce.
    fn get_defaults() -> Value {
        Self::schema().default_value()
    }

    /// Follow `steps` to a nested field of the schema.
    fn field(steps: &[&str]) -> Option<Field> {
        field_at(&Self::schema(), steps).cloned()
    }
}

fn resolve(path: Option<&Path>, default: impl FnOnce() -> PathBuf) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(default)
}

/// Provisioning server settings (`pserv.yaml`).
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningConfig;

impl ProvisioningConfig {
    // Deprecated: OOPS reports are no longer recorded. Kept so old files validate.
    fn oops() -> Schema {
        Schema::new()
            .field("directory", Field::string(""))
            .field("reporter", Field::string(""))
            .require_if_present("reporter", "directory")
    }

    // Deprecated: there is no message broker any more. Kept so old files validate.
    fn broker() -> Schema {
        Schema::new()
            .field("host", Field::string("localhost"))
            .field("port", Field::int(1, 65535, 5673))
            .field("username", Field::string(current_user()))
            .field("password", Field::string("test"))
            .field("vhost", Field::string("/"))
    }

    fn tftp() -> Schema {
        Schema::new()
            // Obsolete TFTP root, only read when upgrading very old clusters.
            .field("root", Field::string("/var/lib/maas/tftp"))
            .field(
                "resource_root",
                Field::string(format!("{}current/", BOOT_RESOURCES_STORAGE)),
            )
            .field("port", Field::int(1, 65535, 69))
            .field(
                "generator",
                Field::string("http://localhost/MAAS/api/1.0/pxeconfig/"),
            )
    }

    // Superseded by boot sources; accepted but unused.
    fn boot() -> Schema {
        Schema::new()
            .field("architectures", Field::set::<String>(None))
            .field(
                "ephemeral",
                Field::Schema(
                    Schema::new()
                        .field("images_directory", Field::optional_string())
                        .field("releases", Field::set::<String>(None)),
                ),
            )
    }
}

impl LegacyConfig for ProvisioningConfig {
    const ENV_VAR: &'static str = "MAAS_PROVISIONING_SETTINGS";
    const DEFAULT_NAME: &'static str = "pserv.yaml";

    fn schema() -> Field {
        Field::Schema(
            Schema::new()
                .field(
                    "logfile",
                    Field::String {
                        if_missing: Some("pserv.log".into()),
                        if_empty: Some("pserv.log".into()),
                    },
                )
                .field("oops", Field::Schema(Self::oops()))
                .field("broker", Field::Schema(Self::broker()))
                .field("tftp", Field::Schema(Self::tftp()))
                .field("rpc", Field::Schema(Schema::new()))
                .field("boot", Field::Schema(Self::boot())),
        )
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "maas".to_string())
}

/// Image sources for boot resource imports (`sources.yaml`).
#[derive(Debug, Clone, Copy)]
pub struct BootSources;

impl BootSources {
    fn selection() -> Schema {
        Schema::new()
            .field("os", Field::string("*"))
            .field("release", Field::string("*"))
            .field("arches", Field::set(Some(vec!["*"])))
            .field("subarches", Field::set(Some(vec!["*"])))
            .field("labels", Field::set(Some(vec!["*"])))
    }

    fn source() -> Schema {
        let selection = Self::selection();
        let default_selection = selection.defaults();
        Schema::new()
            .field(
                "url",
                Field::string("http://maas.ubuntu.com/images/ephemeral-v2/releases/"),
            )
            .field(
                "keyring",
                Field::string("/usr/share/keyrings/ubuntu-cloudimage-keyring.gpg"),
            )
            .field("keyring_data", Field::optional_string())
            .field(
                "selections",
                Field::ForEach {
                    item: Box::new(Field::Schema(selection)),
                    if_missing: vec![default_selection],
                },
            )
    }

    /// Load `path` (or the default file) into typed sources.
    pub fn load_sources(path: Option<&Path>) -> Result<Vec<BootSource>> {
        let doc = Self::load(path)?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Save typed sources after checking they validate.
    pub fn save_sources(sources: &[BootSource], path: Option<&Path>) -> Result<()> {
        let doc = Self::schema().validate(Some(&json!(sources)))?;
        Self::save(&doc, path)
    }
}

impl LegacyConfig for BootSources {
    const ENV_VAR: &'static str = "MAAS_BOOT_SOURCES_SETTINGS";
    const DEFAULT_NAME: &'static str = "sources.yaml";

    fn schema() -> Field {
        Field::for_each(Field::Schema(Self::source()))
    }
}

/// One entry of `sources.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootSource {
    pub url: String,
    pub keyring: String,
    pub keyring_data: Option<String>,
    pub selections: Vec<BootSourceSelection>,
}

/// Which images to take from a boot source. `"*"` matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootSourceSelection {
    pub os: String,
    pub release: String,
    pub arches: Vec<String>,
    pub subarches: Vec<String>,
    pub labels: Vec<String>,
}

impl Default for BootSourceSelection {
    fn default() -> Self {
        Self {
            os: "*".into(),
            release: "*".into(),
            arches: vec!["*".into()],
            subarches: vec!["*".into()],
            labels: vec!["*".into()],
        }
    }
}
