use crate::shared::Result;
use crate::tracking::domain::Revision;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// SourceMirror port for the local mirror of the package-set source tree
///
/// The mirror is shared by every evaluation worker. Implementations must
/// give each evaluation its own checkout so that concurrent evaluations of
/// different revisions never touch each other's files.
#[async_trait]
pub trait SourceMirror: Send + Sync {
    /// Makes `revision` resolvable in the local mirror
    ///
    /// Idempotent: calling it for a revision that is already present does
    /// not touch the network.
    ///
    /// # Errors
    /// Returns `TrackerError::SourceSyncFailed` when the mirror cannot be
    /// created or fetched. The failure is transient from the scheduler's
    /// point of view.
    async fn ensure_revision_available(&self, revision: &Revision) -> Result<()>;

    /// Creates an isolated checkout of `revision`
    ///
    /// # Returns
    /// Path of the checkout root
    async fn checkout(&self, revision: &Revision) -> Result<PathBuf>;

    /// Removes a checkout created by [`SourceMirror::checkout`]
    async fn release(&self, checkout: &Path) -> Result<()>;
}
