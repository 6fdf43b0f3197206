//! Spool file naming and ownership.
//!
//! Large request bodies and oversized multipart parts are written to
//! uniquely named files under the configured spool directory. A
//! [`SpoolPath`] owns such a path exclusively: dropping it unlinks the
//! file, so moving the guard transfers cleanup responsibility with it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

static SPOOL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Produces a fresh `upload-XXXX-XXXX` path under `dir`.
///
/// The name mixes the clock, the process id and a process-wide sequence so
/// concurrent connections never collide; an existing path is retried.
pub fn unique_upload_path(dir: &Path) -> PathBuf {
    loop {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos() as u64).unwrap_or(0);
        let seq = SPOOL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let tag = nanos ^ (u64::from(std::process::id()) << 17) ^ seq.rotate_left(32);

        let path = dir.join(format!("upload-{:04x}-{:04x}", (tag >> 16) & 0xffff, tag & 0xffff));
        if !path.exists() {
            return path;
        }
    }
}

/// Creates a spool file, owner read/write only.
///
/// `create_new` also guards the unique-name generation against a race on
/// the same path.
pub async fn create_spool_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// An exclusively owned temp-file path, unlinked on drop.
pub struct SpoolPath {
    path: PathBuf,
}

impl SpoolPath {
    /// Takes ownership of `path`; the file is removed when the guard drops.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file now instead of waiting for drop.
    ///
    /// Cleanup is best-effort: a failure is logged, never raised.
    pub fn remove(self) {
        // Drop does the work; consuming self just makes the intent explicit.
    }
}

impl Drop for SpoolPath {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "failed to remove spool file");
            }
        }
    }
}

impl fmt::Debug for SpoolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpoolPath").field(&self.path).finish()
    }
}

impl AsRef<Path> for SpoolPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_patterned() {
        let dir = tempfile::tempdir().unwrap();
        let a = unique_upload_path(dir.path());
        let b = unique_upload_path(dir.path());

        assert_ne!(a, b);

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("upload-"));
        assert_eq!(name.len(), "upload-0000-0000".len());
    }

    #[test]
    fn drop_unlinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_upload_path(dir.path());
        std::fs::write(&path, b"spooled").unwrap();

        let guard = SpoolPath::new(path.clone());
        assert!(path.exists());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn remove_is_explicit_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_upload_path(dir.path());
        std::fs::write(&path, b"x").unwrap();

        SpoolPath::new(path.clone()).remove();
        assert!(!path.exists());
    }
}
