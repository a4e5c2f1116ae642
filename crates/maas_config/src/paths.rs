//! Default path resolution and small filesystem helpers.

use crate::error::Result;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an alternative filesystem root.
pub const MAAS_ROOT_ENV: &str = "MAAS_ROOT";

/// Resolve a configuration path.
///
/// Priority:
/// 1) `explicit`
/// 2) the environment variable `env_var`, if set and non-empty
/// 3) `fallback`, relocated under `MAAS_ROOT` when that is set
pub fn resolve_path(explicit: Option<&Path>, env_var: &str, fallback: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env::var_os(env_var) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => tentative_path(fallback),
    }
}

/// Relocate an absolute path under `MAAS_ROOT`, if set.
pub fn tentative_path(path: &str) -> PathBuf {
    match env::var_os(MAAS_ROOT_ENV) {
        Some(root) if !root.is_empty() => {
            PathBuf::from(root).join(path.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

/// Point `env_var` at `path`, so child processes see the same file.
pub fn set_default_path(env_var: &str, path: &Path) {
    env::set_var(env_var, path);
}

/// Remove any override stored in `env_var`.
pub fn clear_default_path(env_var: &str) {
    env::remove_var(env_var);
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Ensure that `path` exists without truncating it.
pub fn touch(path: &Path) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?;
    Ok(())
}

/// Atomic write via temp file + rename.
///
/// The temp file is created next to `path` so the rename never crosses a
/// filesystem boundary. Readers see either the old or the new contents.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    debug!("Atomically wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
