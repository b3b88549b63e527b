use async_trait::async_trait;
use nix_sectrack::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Mock SourceMirror with injectable sync failures
#[derive(Default)]
pub struct MockSourceMirror {
    unreachable: Mutex<HashSet<String>>,
    synced: Mutex<Vec<String>>,
    open_checkouts: Mutex<HashSet<PathBuf>>,
}

impl MockSourceMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes syncing `revision` fail until cleared
    pub fn set_unreachable(&self, revision: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(revision.to_string());
        } else {
            set.remove(revision);
        }
    }

    pub fn synced(&self) -> Vec<String> {
        self.synced.lock().unwrap().clone()
    }

    pub fn open_checkouts(&self) -> usize {
        self.open_checkouts.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceMirror for MockSourceMirror {
    async fn ensure_revision_available(&self, revision: &Revision) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(revision.as_str()) {
            return Err(TrackerError::SourceSyncFailed {
                revision: revision.to_string(),
                path: PathBuf::from("/mock/nixpkgs"),
                details: "fatal: unable to access remote".to_string(),
            }
            .into());
        }
        self.synced.lock().unwrap().push(revision.to_string());
        Ok(())
    }

    async fn checkout(&self, revision: &Revision) -> Result<PathBuf> {
        let mut open = self.open_checkouts.lock().unwrap();
        let path = PathBuf::from(format!("/mock/worktrees/{}-{}", revision, open.len()));
        open.insert(path.clone());
        Ok(path)
    }

    async fn release(&self, checkout: &Path) -> Result<()> {
        self.open_checkouts.lock().unwrap().remove(checkout);
        Ok(())
    }
}
