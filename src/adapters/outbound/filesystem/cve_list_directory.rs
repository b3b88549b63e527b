use crate::ports::outbound::{CveDocumentStream, CveFeed, RawCveDocument};
use crate::shared::error::TrackerError;
use crate::shared::security::{validate_file_size, validate_regular_file, MAX_RECORD_FILE_SIZE};
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Delta candidates are files written no earlier than this many hours
/// before the checkpoint. A record file is rewritten locally whenever its
/// content changes, which is never before its own `dateUpdated`.
const MTIME_SLACK_HOURS: i64 = 24;

/// Only the modification date is read when filtering a delta.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatesOnly {
    cve_metadata: RecordDates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordDates {
    #[serde(default)]
    date_updated: Option<String>,
    #[serde(default)]
    date_published: Option<String>,
}

/// CveListDirectory adapter reading a local checkout of the CVE JSON 5 list
///
/// Records live at `cves/<year>/<bucket>/CVE-*.json`. When `update_before_scan`
/// is set and the directory is a git checkout, it is fast-forwarded with
/// `git pull --ff-only` before each scan.
pub struct CveListDirectory {
    root: PathBuf,
    update_before_scan: bool,
}

impl CveListDirectory {
    pub fn new(root: impl Into<PathBuf>, update_before_scan: bool) -> Self {
        Self {
            root: root.into(),
            update_before_scan,
        }
    }

    async fn update(&self) -> Result<()> {
        if !self.update_before_scan || !self.root.join(".git").exists() {
            return Ok(());
        }

        tracing::info!(path = %self.root.display(), "updating CVE list checkout");
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["pull", "--ff-only", "--quiet"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(self.unavailable(format!(
                "git pull exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn unavailable(&self, details: String) -> anyhow::Error {
        TrackerError::FeedUnavailable {
            feed: self.root.display().to_string(),
            details,
        }
        .into()
    }

    /// Lists the candidate files up front, then reads them lazily in chunks
    async fn scan(
        &self,
        limit: Option<usize>,
        chunk_size: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<CveDocumentStream> {
        self.update().await?;

        let root = self.root.clone();
        if !root.is_dir() {
            return Err(self.unavailable("CVE list directory does not exist".to_string()));
        }

        let paths = tokio::task::spawn_blocking(move || list_candidates(&root, since))
            .await
            .context("CVE list scan did not finish")??;
        tracing::debug!(candidates = paths.len(), since = ?since, "listed CVE records");

        let pending = PendingRecords {
            paths: paths.into_iter(),
            remaining: limit,
            chunk_size: chunk_size.max(1),
            since,
        };
        Ok(futures::stream::try_unfold(pending, next_chunk).boxed())
    }
}

/// Record files of a scan that have not been read yet
struct PendingRecords {
    paths: std::vec::IntoIter<PathBuf>,
    remaining: Option<usize>,
    chunk_size: usize,
    since: Option<DateTime<Utc>>,
}

impl PendingRecords {
    /// Reads files until a chunk is full, the limit is reached or no file is left
    fn read_chunk(&mut self) -> Vec<RawCveDocument> {
        let wanted = self
            .remaining
            .map_or(self.chunk_size, |remaining| remaining.min(self.chunk_size));
        let mut documents = Vec::with_capacity(wanted);

        while documents.len() < wanted {
            let Some(path) = self.paths.next() else {
                break;
            };
            match read_record(&path) {
                Ok(content) if self.since.map_or(true, |since| modified_since(&content, since)) => {
                    documents.push(RawCveDocument {
                        origin: path.display().to_string(),
                        content,
                    })
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable CVE record");
                }
            }
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= documents.len();
        }
        documents
    }
}

async fn next_chunk(
    mut pending: PendingRecords,
) -> Result<Option<(Vec<RawCveDocument>, PendingRecords)>> {
    let (documents, pending) = tokio::task::spawn_blocking(move || {
        let documents = pending.read_chunk();
        (documents, pending)
    })
    .await
    .context("CVE record reader did not finish")?;

    if documents.is_empty() {
        return Ok(None);
    }
    Ok(Some((documents, pending)))
}

/// Sorted record paths, restricted to recently written files for a delta
fn list_candidates(root: &Path, since: Option<DateTime<Utc>>) -> Result<Vec<PathBuf>> {
    let records_root = if root.join("cves").is_dir() {
        root.join("cves")
    } else {
        root.to_path_buf()
    };
    let mut paths = Vec::new();
    collect_record_paths(&records_root, &mut paths)?;

    if let Some(since) = since {
        let cutoff = SystemTime::from(since - chrono::Duration::hours(MTIME_SLACK_HOURS));
        paths.retain(|path| written_since(path, cutoff));
    }
    paths.sort();
    Ok(paths)
}

/// Files whose modification time cannot be read are kept
fn written_since(path: &Path, cutoff: SystemTime) -> bool {
    fs::symlink_metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_or(true, |modified| modified >= cutoff)
}

fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("CVE-") && n.ends_with(".json"))
}

fn collect_record_paths(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Failed to read directory {}: {}", dir.display(), e))?
    {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            if entry.file_name() != ".git" {
                collect_record_paths(&path, paths)?;
            }
        } else if file_type.is_file() && is_record_file(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

fn read_record(path: &Path) -> Result<String> {
    validate_regular_file(path, "CVE record")?;
    let size = fs::metadata(path)?.len();
    validate_file_size(size, path, MAX_RECORD_FILE_SIZE)?;
    fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read CVE record {}: {}", path.display(), e))
}

fn parse_record_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Whether a document belongs to the delta starting at `since`
///
/// Documents whose date cannot be read are kept so that the parser reports
/// them as malformed instead of silently dropping them.
fn modified_since(content: &str, since: DateTime<Utc>) -> bool {
    let Ok(record) = serde_json::from_str::<DatesOnly>(content) else {
        return true;
    };
    let meta = record.cve_metadata;
    match meta
        .date_updated
        .or(meta.date_published)
        .as_deref()
        .and_then(parse_record_date)
    {
        Some(modified) => modified >= since,
        None => true,
    }
}

#[async_trait]
impl CveFeed for CveListDirectory {
    async fn fetch_all(
        &self,
        limit: Option<usize>,
        chunk_size: usize,
    ) -> Result<CveDocumentStream> {
        self.scan(limit, chunk_size, None).await
    }

    async fn fetch_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<CveDocumentStream> {
        self.scan(None, chunk_size, since).await
    }
}
