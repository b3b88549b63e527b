/// FetchReport - Result of one channel fetch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Metric tuples returned by the monitoring feed
    pub observed: usize,
    /// Channel rows created by this run
    pub created: usize,
    /// Channels that are new or whose revision moved
    pub revision_changed: usize,
    /// New-revision events emitted
    pub scheduled: usize,
    /// Tuples skipped because they were malformed or repeated a channel name
    pub skipped: usize,
    /// Tuples whose upsert failed
    pub failed: usize,
}

impl FetchReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
