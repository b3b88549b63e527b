use crate::tracking::domain::RecomputeKey;

/// RegenerateReport - Result of a forced full suggestion cache pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenerateReport {
    /// Keys whose rebuild committed
    pub rebuilt: usize,
    /// Keys already in flight; their running pass picks up the request
    pub coalesced: usize,
    /// Stale rows deleted across all rebuilt keys
    pub removed: usize,
    /// Fresh rows written across all rebuilt keys
    pub inserted: usize,
    /// Keys whose rebuild failed, with the error message
    pub failures: Vec<(RecomputeKey, String)>,
}
