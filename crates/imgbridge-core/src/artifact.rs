//! Temporary artifacts: request-scoped files holding fetched or converted bytes.
//!
//! Each artifact is a [`TempPath`] created in the configured temp directory.
//! [`ArtifactSet::release`] deletes every artifact of a request concurrently
//! and is awaited before the request returns; dropping the set still removes
//! the files, which covers panics and cancelled requests.

use std::io;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tempfile::{Builder, TempPath};

pub const DEFAULT_PREFIX: &str = "mcp_upload_";

const MAX_PREFIX_LEN: usize = 64;
const RANDOM_LEN: usize = 16;

/// Replace anything outside `[A-Za-z0-9_-]` so the prefix cannot leave the
/// temp directory. A blank prefix falls back to [`DEFAULT_PREFIX`].
pub fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .trim()
        .chars()
        .take(MAX_PREFIX_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        cleaned
    }
}

/// The artifacts of a single request, named `{prefix}{random}.{ext}` in `dir`.
#[derive(Debug)]
pub struct ArtifactSet {
    dir: PathBuf,
    prefix: String,
    artifacts: Vec<TempPath>,
}

impl ArtifactSet {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: sanitize_prefix(prefix),
            artifacts: Vec::new(),
        }
    }

    /// Create an empty artifact file and return its path. The set owns the
    /// file from here on; stages overwrite it in place.
    pub fn create(&mut self, extension: &str) -> io::Result<PathBuf> {
        let path = Builder::new()
            .prefix(&self.prefix)
            .suffix(&format!(".{}", extension))
            .rand_bytes(RANDOM_LEN)
            .tempfile_in(&self.dir)?
            .into_temp_path();

        let owned = path.to_path_buf();
        self.artifacts.push(path);
        Ok(owned)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Delete every artifact. Failures are logged, never returned.
    pub async fn release(self) {
        let removals = self.artifacts.into_iter().map(|artifact| async move {
            let path = artifact.to_path_buf();
            let result = tokio::task::spawn_blocking(move || artifact.close())
                .await
                .unwrap_or_else(|e| Err(io::Error::other(e)));
            log_removal(&path, result);
        });
        join_all(removals).await;
    }
}

fn log_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed temporary artifact"),
        // Already gone: a failed download discards its own partial file.
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Temporary artifact already removed")
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary artifact")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(sanitize_prefix("mcp_upload_"), "mcp_upload_");
        assert_eq!(sanitize_prefix("../../etc/"), "______etc_");
        assert_eq!(sanitize_prefix("my photo-"), "my_photo-");
        assert_eq!(sanitize_prefix("   "), DEFAULT_PREFIX);
        assert_eq!(sanitize_prefix(&"a".repeat(200)).len(), MAX_PREFIX_LEN);
    }

    #[tokio::test]
    async fn test_names_are_unique_and_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = ArtifactSet::new(dir.path(), "pre_");
        let a = set.create("webp").unwrap();
        let b = set.create("jpg").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(a.exists());

        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("pre_"));
        assert!(name.ends_with(".webp"));
        assert_eq!(name.len(), "pre_".len() + RANDOM_LEN + ".webp".len());
        assert_eq!(set.len(), 2);

        set.release().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_release_tolerates_already_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = ArtifactSet::new(dir.path(), DEFAULT_PREFIX);
        let written = set.create("png").unwrap();
        let discarded = set.create("jpg").unwrap();
        tokio::fs::write(&written, b"bytes").await.unwrap();
        tokio::fs::remove_file(&discarded).await.unwrap();

        set.release().await;

        assert!(!written.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = ArtifactSet::new(dir.path().join("absent"), DEFAULT_PREFIX);
        assert!(set.create("png").is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn test_drop_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut set = ArtifactSet::new(dir.path(), DEFAULT_PREFIX);
            let path = set.create("png").unwrap();
            std::fs::write(&path, b"bytes").unwrap();
            path
        };
        assert!(!path.exists());
    }
}
