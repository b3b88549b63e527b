use crate::ports::outbound::SourceMirror;
use crate::shared::error::TrackerError;
use crate::shared::security::validate_command_argument;
use crate::shared::Result;
use crate::tracking::domain::Revision;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tokio::sync::Mutex;

/// GitMirror adapter keeping a bare mirror of the package-set repository
///
/// Every evaluation gets its own detached worktree under `worktrees_path`,
/// so concurrent evaluations of different revisions never share files.
/// Operations that modify the mirror's metadata (clone, fetch, worktree
/// add/remove) are serialized by an async mutex.
pub struct GitMirror {
    clone_url: String,
    mirror_path: PathBuf,
    worktrees_path: PathBuf,
    lock: Mutex<()>,
}

impl GitMirror {
    pub fn new(
        clone_url: impl Into<String>,
        mirror_path: impl Into<PathBuf>,
        worktrees_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            clone_url: clone_url.into(),
            mirror_path: mirror_path.into(),
            worktrees_path: worktrees_path.into(),
            lock: Mutex::new(()),
        }
    }

    fn git(&self) -> Command {
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.mirror_path).kill_on_drop(true);
        command
    }

    fn sync_failed(&self, revision: &Revision, details: impl Into<String>) -> anyhow::Error {
        TrackerError::SourceSyncFailed {
            revision: revision.to_string(),
            path: self.mirror_path.clone(),
            details: details.into(),
        }
        .into()
    }

    async fn run(&self, mut command: Command, revision: &Revision) -> Result<Output> {
        let output = command
            .output()
            .await
            .map_err(|e| self.sync_failed(revision, format!("failed to run git: {}", e)))?;
        if !output.status.success() {
            return Err(self.sync_failed(
                revision,
                format!(
                    "git exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(output)
    }

    async fn has_commit(&self, revision: &Revision) -> bool {
        let mut command = self.git();
        command
            .args(["cat-file", "-e"])
            .arg(format!("{}^{{commit}}", revision));
        command
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Sibling directory a clone is written to before it is moved into place
    fn partial_path(&self) -> PathBuf {
        let mut partial = self.mirror_path.clone().into_os_string();
        partial.push(".partial");
        PathBuf::from(partial)
    }

    /// Clones into the partial path and renames it, so `mirror_path` only
    /// ever exists as a complete clone
    async fn clone_mirror(&self, revision: &Revision) -> Result<()> {
        validate_command_argument(&self.clone_url, "Clone URL")?;
        if let Some(parent) = self.mirror_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = self.partial_path();
        if partial.exists() {
            tracing::warn!(path = %partial.display(), "removing leftover partial clone");
            tokio::fs::remove_dir_all(&partial).await?;
        }

        tracing::info!(url = %self.clone_url, path = %self.mirror_path.display(), "cloning source mirror");
        let mut command = Command::new("git");
        command
            .args(["clone", "--bare", "--quiet"])
            .arg(&self.clone_url)
            .arg(&partial)
            .kill_on_drop(true);
        if let Err(e) = self.run(command, revision).await {
            if partial.exists() {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&partial).await {
                    tracing::warn!(path = %partial.display(), error = %cleanup, "failed to remove partial clone");
                }
            }
            return Err(e);
        }

        tokio::fs::rename(&partial, &self.mirror_path)
            .await
            .map_err(|e| self.sync_failed(revision, format!("failed to move clone into place: {}", e)))?;
        Ok(())
    }

    async fn fetch(&self, revision: &Revision) -> Result<()> {
        tracing::info!(revision = %revision, "fetching revision into source mirror");
        let mut by_id = self.git();
        by_id.args(["fetch", "--quiet", "origin"]).arg(revision.as_str());
        if self.run(by_id, revision).await.is_ok() {
            return Ok(());
        }

        // Some servers refuse fetching unadvertised commits; fall back to all branches.
        let mut all = self.git();
        all.args(["fetch", "--quiet", "origin", "+refs/heads/*:refs/heads/*"]);
        self.run(all, revision).await?;
        Ok(())
    }
}

#[async_trait]
impl SourceMirror for GitMirror {
    async fn ensure_revision_available(&self, revision: &Revision) -> Result<()> {
        validate_command_argument(revision.as_str(), "Revision")?;
        let _guard = self.lock.lock().await;

        if !self.mirror_path.exists() {
            self.clone_mirror(revision).await?;
        }

        if self.has_commit(revision).await {
            tracing::debug!(revision = %revision, "revision already present in source mirror");
            return Ok(());
        }

        self.fetch(revision).await?;
        if !self.has_commit(revision).await {
            return Err(self.sync_failed(revision, "revision not found after fetch"));
        }
        Ok(())
    }

    async fn checkout(&self, revision: &Revision) -> Result<PathBuf> {
        validate_command_argument(revision.as_str(), "Revision")?;
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.worktrees_path).await?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", revision, &suffix[..8]);
        let path = std::path::absolute(self.worktrees_path.join(name))?;

        let mut command = self.git();
        command
            .args(["worktree", "add", "--detach", "--quiet"])
            .arg(&path)
            .arg(revision.as_str());
        self.run(command, revision).await?;

        tracing::debug!(revision = %revision, path = %path.display(), "created worktree");
        Ok(path)
    }

    async fn release(&self, checkout: &Path) -> Result<()> {
        let _guard = self.lock.lock().await;

        let removed = self
            .git()
            .args(["worktree", "remove", "--force"])
            .arg(checkout)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !removed {
            tracing::warn!(path = %checkout.display(), "git worktree remove failed, deleting directory");
            if checkout.exists() {
                tokio::fs::remove_dir_all(checkout).await?;
            }
            match self.git().args(["worktree", "prune"]).output().await {
                Ok(output) if output.status.success() => {}
                Ok(output) => tracing::warn!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git worktree prune failed"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to run git worktree prune"),
            }
        }
        Ok(())
    }
}
