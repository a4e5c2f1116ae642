//! Cross-process locking for configuration files.
//!
//! Only one reader or writer may hold a configuration file at a time. The
//! lock lives in a sidecar `<path>.lock` file so the configuration itself
//! can be replaced atomically while the lock is held.
//!
//! The lock file is left in place on release. A waiter may already have it
//! open; unlinking it would let a later opener lock a fresh file at the same
//! path while that waiter locks the old one.
//!
//! Uses the `fs2` crate for cross-platform file locking.
//! Note: std::fs::File::lock() requires Rust 1.89+, so we use fs2 instead.

use crate::error::{ConfigError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long `lock_exclusive` waits before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A guard that holds an exclusive lock on a configuration file.
///
/// The lock is automatically released when the guard is dropped.
pub struct FileLockGuard {
    file: File,
    lock_path: PathBuf,
}

impl FileLockGuard {
    /// Get the path to the lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.lock_path.display(), e);
        }
        debug!("Released configuration lock: {}", self.lock_path.display());
    }
}

impl std::fmt::Debug for FileLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLockGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

/// Get the lock file path for a configuration path.
///
/// Examples:
/// - `/etc/maas/cluster.conf` → `/etc/maas/cluster.conf.lock`
/// - `/etc/maas/cluster` → `/etc/maas/cluster.lock` (no double-dot)
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock_path = path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// Acquire an exclusive lock on `path`, waiting at most [`LOCK_TIMEOUT`].
pub fn lock_exclusive(path: &Path) -> Result<FileLockGuard> {
    lock_exclusive_timeout(path, LOCK_TIMEOUT)
}

/// Acquire an exclusive lock on `path`, waiting at most `timeout`.
///
/// Fails with [`ConfigError::LockTimeout`] if another holder has not
/// released the lock by then. Never retries beyond the deadline.
pub fn lock_exclusive_timeout(path: &Path, timeout: Duration) -> Result<FileLockGuard> {
    let lock_path = lock_path_for(path);

    debug!("Waiting to acquire configuration lock: {}", lock_path.display());

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| ConfigError::Lock {
            path: lock_path.clone(),
            source,
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        // Fully qualified so this resolves to fs2 and not the std method
        // added in Rust 1.89, which has a different error type.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired configuration lock: {}", lock_path.display());
                return Ok(FileLockGuard { file, lock_path });
            }
            Err(e) if is_contended(&e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ConfigError::LockTimeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
            Err(source) => {
                return Err(ConfigError::Lock {
                    path: lock_path,
                    source,
                })
            }
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        let lock = lock_path_for(Path::new("/etc/maas/cluster.conf"));
        assert_eq!(lock, PathBuf::from("/etc/maas/cluster.conf.lock"));

        let lock_no_ext = lock_path_for(Path::new("/etc/maas/cluster"));
        assert_eq!(lock_no_ext, PathBuf::from("/etc/maas/cluster.lock"));

        let lock_dots = lock_path_for(Path::new("/etc/maas/my.cluster.yaml"));
        assert_eq!(lock_dots, PathBuf::from("/etc/maas/my.cluster.yaml.lock"));
    }

    #[test]
    fn test_lock_and_relock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cluster.conf");

        let guard = lock_exclusive(&path).unwrap();
        assert!(guard.lock_path().exists());
        drop(guard);

        let _guard2 = lock_exclusive(&path).unwrap();
    }

    #[test]
    fn test_lock_file_kept_after_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cluster.conf");

        let guard = lock_exclusive(&path).unwrap();
        let lock_path = guard.lock_path().to_path_buf();
        drop(guard);

        assert!(lock_path.exists());
        let _again = lock_exclusive_timeout(&path, Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn test_lock_contention_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cluster.conf");

        let _guard = lock_exclusive(&path).unwrap();

        let started = Instant::now();
        let result = lock_exclusive_timeout(&path, Duration::from_millis(200));
        assert!(matches!(result, Err(ConfigError::LockTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cluster.conf");

        let guard = lock_exclusive(&path).unwrap();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || lock_exclusive(&waiter_path).map(|_| ()));

        thread::sleep(Duration::from_millis(150));
        drop(guard);

        waiter.join().unwrap().unwrap();
    }
}
