use chrono::{DateTime, Utc};
use std::fmt;

/// Which part of the CVE corpus a run reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Records modified since the stored checkpoint
    Delta,
    /// The full corpus, optionally capped
    Bulk { limit: Option<usize> },
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Delta => write!(f, "delta"),
            IngestMode::Bulk { limit: None } => write!(f, "bulk"),
            IngestMode::Bulk { limit: Some(n) } => write!(f, "bulk (limit {})", n),
        }
    }
}

/// IngestReport - Result of one CVE ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub mode: IngestMode,
    /// Documents returned by the feed
    pub fetched: usize,
    /// Documents that failed to parse and were skipped
    pub malformed: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records not newer than the stored version
    pub skipped: usize,
    /// Checkpoint committed by this run, if it advanced
    pub checkpoint: Option<DateTime<Utc>>,
}

impl IngestReport {
    pub fn new(mode: IngestMode) -> Self {
        Self {
            mode,
            fetched: 0,
            malformed: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            checkpoint: None,
        }
    }

    /// Number of records that emitted a CVE-changed event
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}
