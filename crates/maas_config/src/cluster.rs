//! Local configuration for a MAAS cluster controller.

use crate::configuration::{Configuration, ConfigurationKind, ConfigurationOption, OptionSpec};
use crate::error::{ConfigError, Result};
use crate::file_store::FileBackend;
use crate::validators::{Directory, ExtendedUrl, Int};
use std::path::{Path, PathBuf};

pub static MAAS_URL: ConfigurationOption<ExtendedUrl> = ConfigurationOption::new(
    "maas_url",
    "The HTTP URL for the MAAS region.",
    ExtendedUrl {
        if_missing: "http://localhost:5240/MAAS",
    },
);

pub static TFTP_PORT: ConfigurationOption<Int> = ConfigurationOption::new(
    "tftp_port",
    "The UDP port on which to listen for TFTP requests.",
    Int {
        min: Some(0),
        max: Some(u16::MAX as i64),
        if_missing: 69,
    },
);

pub static TFTP_ROOT: ConfigurationOption<Directory> = ConfigurationOption::new(
    "tftp_root",
    "The root directory for TFTP resources.",
    Directory {
        if_missing: "/var/lib/maas/boot-resources/current",
    },
);

static OPTIONS: [&dyn OptionSpec; 3] = [&MAAS_URL, &TFTP_PORT, &TFTP_ROOT];

/// Cluster configuration: `/etc/maas/cluster.conf`, YAML, overridable
/// through `MAAS_CLUSTER_CONFIG`.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig;

impl ConfigurationKind for ClusterConfig {
    const NAME: &'static str = "ClusterConfiguration";
    const ENV_VAR: &'static str = "MAAS_CLUSTER_CONFIG";
    const DEFAULT_PATH: &'static str = "/etc/maas/cluster.conf";
    type Backend = FileBackend;

    fn options() -> &'static [&'static dyn OptionSpec] {
        &OPTIONS
    }
}

pub type ClusterConfiguration<'s> = Configuration<'s, ClusterConfig>;

impl ClusterConfiguration<'_> {
    pub fn maas_url(&self) -> Result<String> {
        self.get(&MAAS_URL)
    }

    pub fn set_maas_url(&mut self, url: impl Into<String>) -> Result<()> {
        self.set(&MAAS_URL, &url.into())
    }

    pub fn delete_maas_url(&mut self) -> Result<()> {
        self.delete(&MAAS_URL)
    }

    pub fn tftp_port(&self) -> Result<u16> {
        let port = self.get(&TFTP_PORT)?;
        u16::try_from(port)
            .map_err(|_| ConfigError::invalid(format!("tftp_port {} is out of range", port)))
    }

    pub fn set_tftp_port(&mut self, port: u16) -> Result<()> {
        self.set(&TFTP_PORT, &i64::from(port))
    }

    pub fn delete_tftp_port(&mut self) -> Result<()> {
        self.delete(&TFTP_PORT)
    }

    pub fn tftp_root(&self) -> Result<PathBuf> {
        self.get(&TFTP_ROOT)
    }

    /// Fails unless `root` is an existing directory.
    pub fn set_tftp_root(&mut self, root: impl AsRef<Path>) -> Result<()> {
        self.set(&TFTP_ROOT, &root.as_ref().to_path_buf())
    }

    pub fn delete_tftp_root(&mut self) -> Result<()> {
        self.delete(&TFTP_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::test_env::EnvGuard;
    use crate::paths::MAAS_ROOT_ENV;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.conf");

        ClusterConfig::open(Some(&path), |config| {
            assert_eq!(config.maas_url()?, "http://localhost:5240/MAAS");
            assert_eq!(config.tftp_port()?, 69);
            assert_eq!(
                config.tftp_root()?,
                PathBuf::from("/var/lib/maas/boot-resources/current")
            );
            Ok::<_, ConfigError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_set_tftp_root_requires_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.conf");
        let missing = tmp.path().join("missing");

        let root = ClusterConfig::open(Some(&path), |config| {
            assert!(config.set_tftp_root(&missing).is_err());
            config.set_tftp_root(tmp.path())?;
            config.tftp_root()
        })
        .unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn test_bad_url_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.conf");

        ClusterConfig::open(Some(&path), |config| {
            assert!(config.set_maas_url("not a url").is_err());
            config.set_maas_url("http://[::1]:5240/MAAS")?;
            assert_eq!(config.maas_url()?, "http://[::1]:5240/MAAS");
            config.delete_maas_url()?;
            assert_eq!(config.maas_url()?, "http://localhost:5240/MAAS");
            Ok::<_, ConfigError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_default_path_follows_environment() {
        let _env = EnvGuard::new(&[ClusterConfig::ENV_VAR, MAAS_ROOT_ENV]);
        assert_eq!(
            ClusterConfig::default_path(),
            PathBuf::from("/etc/maas/cluster.conf")
        );

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("etc").join("cluster.conf");
        ClusterConfig::set_default_path(&path);
        assert_eq!(ClusterConfig::default_path(), path);

        ClusterConfig::open(None, |config| config.set_tftp_port(1069)).unwrap();
        assert!(path.exists());

        ClusterConfig::clear_default_path();
        assert!(std::env::var_os(ClusterConfig::ENV_VAR).is_none());
    }
}
