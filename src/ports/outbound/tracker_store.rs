use crate::shared::Result;
use crate::tracking::domain::{
    Channel, ChannelName, ChannelObservation, ChannelSnapshot, ChannelUpdate, CveId, CveRecord,
    Evaluation, EvaluationId, EvaluationOutcome, PendingChange, RebuildSummary, RecomputeKey,
    Revision, StoredSuggestion, Suggestion,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Notify;

/// Name of the delta-ingestion checkpoint
pub const CVE_DELTA_CHECKPOINT: &str = "cve_delta";

/// Pure suggestion computation handed to the store for one cache rebuild
pub type SuggestionComputer<'a> = dyn Fn(&ChannelSnapshot, &[CveRecord]) -> Vec<Suggestion> + 'a;

/// Per-record outcome counts of one committed CVE batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CveBatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Records whose last-modified date was not newer than the stored one
    pub skipped: usize,
    /// Identifiers of inserted or updated records, in batch order
    pub changed: Vec<CveId>,
}

/// TrackerStore port for the durable data store
///
/// The store is the sole arbiter of pipeline state. Every method runs in
/// its own transaction scoped to one logical operation, and every change
/// event is written to the outbox inside the transaction that caused it, so
/// an event only becomes visible once the mutation has committed.
pub trait TrackerStore: Send + Sync {
    // ========== Channels ==========

    /// Upserts a channel and, if its revision is new and its status is
    /// evaluated, emits a new-revision event in the same transaction
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no partial channel state
    /// is left behind.
    fn record_channel_observation(&self, observation: &ChannelObservation)
        -> Result<ChannelUpdate>;

    /// All channels, ordered by name
    fn channels(&self) -> Result<Vec<Channel>>;

    // ========== Evaluations ==========

    /// Creates a PENDING evaluation unless one exists for the pair
    ///
    /// # Returns
    /// The new evaluation id, or `None` if (channel, revision) is already recorded
    fn create_pending_evaluation(
        &self,
        channel: &ChannelName,
        revision: &Revision,
    ) -> Result<Option<EvaluationId>>;

    /// Oldest PENDING evaluations first
    fn next_pending_evaluations(&self, limit: usize) -> Result<Vec<Evaluation>>;

    /// Transitions PENDING -> RUNNING if the evaluation is still pending
    ///
    /// # Returns
    /// `false` when another worker claimed it first
    fn claim_evaluation(&self, id: EvaluationId) -> Result<bool>;

    /// Transitions RUNNING -> COMPLETED or FAILED
    ///
    /// A COMPLETED outcome stores the snapshot and emits an
    /// evaluation-completed event in the same transaction.
    ///
    /// # Errors
    /// Returns `TrackerError::InvalidTransition` if the evaluation is not RUNNING.
    fn finish_evaluation(&self, id: EvaluationId, outcome: &EvaluationOutcome) -> Result<()>;

    /// Fails every RUNNING evaluation with `reason`
    fn recover_interrupted_evaluations(&self, reason: &str) -> Result<Vec<EvaluationId>>;

    fn evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>>;

    /// All evaluations in creation order
    fn evaluations(&self) -> Result<Vec<Evaluation>>;

    /// Channels whose latest COMPLETED evaluation exists, ordered by name
    fn channels_with_completed_evaluations(&self) -> Result<Vec<ChannelName>>;

    /// Snapshot of the most recently created COMPLETED evaluation of `channel`
    fn latest_channel_snapshot(&self, channel: &ChannelName) -> Result<Option<ChannelSnapshot>>;

    // ========== CVE records ==========

    /// Upserts a batch of records and optionally advances a checkpoint, all
    /// in one transaction
    ///
    /// Records not newer than the stored version are skipped. Each inserted
    /// or updated record emits a CVE-changed event.
    ///
    /// # Arguments
    /// * `records` - Parsed records of the batch
    /// * `checkpoint` - `(name, value)` to store when the batch commits
    fn upsert_cve_batch(
        &self,
        records: &[CveRecord],
        checkpoint: Option<(&str, DateTime<Utc>)>,
    ) -> Result<CveBatchOutcome>;

    fn cve_record(&self, id: &CveId) -> Result<Option<CveRecord>>;

    fn cve_count(&self) -> Result<usize>;

    fn checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    // ========== Suggestions ==========

    /// Replaces every suggestion row of `key` with freshly computed ones
    ///
    /// Inputs are read from one committed state no older than the one at
    /// the start of the call. `compute` runs without holding the store, and
    /// the stale rows are swapped for the new ones in a single transaction.
    ///
    /// # Arguments
    /// * `key` - The CVE or channel to rebuild
    /// * `compute` - Pure function from (channel snapshot, CVE records) to suggestions
    fn rebuild_suggestions(
        &self,
        key: &RecomputeKey,
        compute: &SuggestionComputer<'_>,
    ) -> Result<RebuildSummary>;

    /// Stored suggestions of `key`, ordered by (CVE, channel, package)
    fn suggestions_for(&self, key: &RecomputeKey) -> Result<Vec<StoredSuggestion>>;

    fn suggestion_count(&self) -> Result<usize>;

    // ========== Change outbox ==========

    /// Undelivered events, oldest first
    fn pending_changes(&self, limit: usize) -> Result<Vec<PendingChange>>;

    /// Marks events as delivered
    fn ack_changes(&self, sequences: &[i64]) -> Result<()>;

    /// Signalled after every commit that wrote change events
    fn commit_signal(&self) -> Arc<Notify>;
}
