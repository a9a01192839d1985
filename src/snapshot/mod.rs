//! Repository snapshots: a fresh local checkout per analyze.
//!
//! Every fetch clones into `<workspace>/repo-<uuid>`, so two fetches never
//! write into the same directory. A failed clone leaves nothing behind.
//! Removing old snapshots is a separate, best-effort step ([`dispose`]).

use crate::error::{RagError, RagResult};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A local checkout of a remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub url: String,
    pub path: PathBuf,
}

/// Produces repository snapshots from a URL
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, url: &str) -> RagResult<Snapshot>;
}

/// Clones repositories with the system `git` binary.
pub struct GitFetcher {
    workspace_dir: PathBuf,
    clone_timeout: Duration,
}

impl GitFetcher {
    pub fn new(workspace_dir: impl Into<PathBuf>, clone_timeout: Duration) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            clone_timeout,
        }
    }

    async fn clone_into(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--quiet", "--"])
            .arg(url)
            .arg(dest)
            // Never block on a credential prompt for private repositories
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.clone_timeout, cmd.output())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "git clone timed out after {}s",
                    self.clone_timeout.as_secs()
                )
            })?
            .context("Failed to execute 'git clone'. Is git installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git clone failed: {}", stderr.trim());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl SnapshotSource for GitFetcher {
    async fn fetch(&self, url: &str) -> RagResult<Snapshot> {
        let url = url.trim();
        let fetch_error = |source: anyhow::Error| RagError::RepositoryFetch {
            url: url.to_string(),
            source,
        };

        if url.is_empty() {
            return Err(fetch_error(anyhow::anyhow!("repository URL is empty")));
        }

        fs::create_dir_all(&self.workspace_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create workspace directory: {}",
                    self.workspace_dir.display()
                )
            })
            .map_err(fetch_error)?;

        let path = new_snapshot_path(&self.workspace_dir);
        tracing::info!("Cloning {} into {}", url, path.display());

        if let Err(e) = self.clone_into(url, &path).await {
            remove_partial_clone(&path).await;
            return Err(fetch_error(e));
        }

        tracing::info!("Clone complete: {}", path.display());
        Ok(Snapshot {
            url: url.to_string(),
            path,
        })
    }
}

/// A collision-free snapshot directory under `workspace_dir`.
pub fn new_snapshot_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(format!("repo-{}", Uuid::new_v4().simple()))
}

async fn remove_partial_clone(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!("Removed partial clone at {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial clone {}: {}", path.display(), e),
    }
}

/// Delete a snapshot directory in the background.
///
/// Failures are logged and otherwise ignored; an already missing directory
/// is not an error.
pub fn dispose(path: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        match fs::remove_dir_all(&path).await {
            Ok(()) => tracing::info!("Cleaned up previous snapshot: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Snapshot already gone: {}", path.display())
            }
            Err(e) => tracing::warn!("Failed to clean up snapshot {}: {}", path.display(), e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_paths_are_unique() {
        let root = Path::new("/tmp/workspace");
        let a = new_snapshot_path(root);
        let b = new_snapshot_path(root);
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(root));
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let fetcher = GitFetcher::new(workspace.path(), Duration::from_secs(30));

        let err = fetcher.fetch("   ").await.unwrap_err();
        assert!(matches!(err, RagError::RepositoryFetch { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_repository_leaves_no_directory() {
        let workspace = tempfile::tempdir().unwrap();
        let missing = workspace.path().join("does-not-exist");
        let clones = workspace.path().join("clones");
        let fetcher = GitFetcher::new(&clones, Duration::from_secs(30));

        let err = fetcher
            .fetch(&missing.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RepositoryFetch { .. }));
        assert!(err.to_string().contains("Failed to fetch repository"));

        let leftovers = std::fs::read_dir(&clones).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_clone_timeout_fails_and_cleans_up() {
        let workspace = tempfile::tempdir().unwrap();
        let clones = workspace.path().join("clones");
        let fetcher = GitFetcher::new(&clones, Duration::ZERO);

        let err = fetcher
            .fetch("https://example.invalid/slow.git")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RepositoryFetch { .. }));
        let message = err.to_string();
        // Without git on PATH the spawn fails before the deadline is checked
        assert!(
            message.contains("timed out after 0s") || message.contains("Is git installed"),
            "unexpected error: {}",
            message
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(std::fs::read_dir(&clones).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_removes_directory_and_tolerates_missing() {
        let workspace = tempfile::tempdir().unwrap();
        let snapshot = workspace.path().join("repo-old");
        std::fs::create_dir_all(snapshot.join("src")).unwrap();
        std::fs::write(snapshot.join("src/main.py"), "print('hi')").unwrap();

        dispose(snapshot.clone()).await.unwrap();
        assert!(!snapshot.exists());

        // Second disposal of the same path is a no-op
        dispose(snapshot).await.unwrap();
    }
}
