use chrono::{DateTime, Utc};
use nix_sectrack::ports::outbound::SuggestionComputer;
use nix_sectrack::prelude::*;
use nix_sectrack::tracking::domain::{ChannelUpdate, PendingChange};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// SQLite store wrapper that counts calls and injects faults
///
/// * `fail_cve_batch_at` makes the n-th (1-based) `upsert_cve_batch` call fail
///   before touching the database, simulating a crash mid-ingestion.
/// * `rebuild_delay` makes every suggestion rebuild block for that long.
/// * `compute_delay_ms` slows down each suggestion computation of a rebuild;
///   it can be changed while the store is shared.
/// * `failing_rebuilds` fails that many of the next rebuild calls.
pub struct InstrumentedStore {
    inner: SqliteTrackerStore,
    fail_cve_batch_at: Option<usize>,
    rebuild_delay: Duration,
    compute_delay_ms: AtomicU64,
    failing_rebuilds: AtomicUsize,
    cve_batch_calls: AtomicUsize,
    rebuild_calls: AtomicUsize,
}

impl InstrumentedStore {
    pub fn new(inner: SqliteTrackerStore) -> Self {
        Self {
            inner,
            fail_cve_batch_at: None,
            rebuild_delay: Duration::ZERO,
            compute_delay_ms: AtomicU64::new(0),
            failing_rebuilds: AtomicUsize::new(0),
            cve_batch_calls: AtomicUsize::new(0),
            rebuild_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_cve_batch(mut self, call: usize) -> Self {
        self.fail_cve_batch_at = Some(call);
        self
    }

    pub fn with_rebuild_delay(mut self, delay: Duration) -> Self {
        self.rebuild_delay = delay;
        self
    }

    pub fn set_compute_delay(&self, delay: Duration) {
        self.compute_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_next_rebuilds(&self, count: usize) {
        self.failing_rebuilds.store(count, Ordering::SeqCst);
    }

    pub fn rebuild_calls(&self) -> usize {
        self.rebuild_calls.load(Ordering::SeqCst)
    }
}

impl TrackerStore for InstrumentedStore {
    fn record_channel_observation(
        &self,
        observation: &ChannelObservation,
    ) -> Result<ChannelUpdate> {
        self.inner.record_channel_observation(observation)
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        self.inner.channels()
    }

    fn create_pending_evaluation(
        &self,
        channel: &ChannelName,
        revision: &Revision,
    ) -> Result<Option<EvaluationId>> {
        self.inner.create_pending_evaluation(channel, revision)
    }

    fn next_pending_evaluations(&self, limit: usize) -> Result<Vec<Evaluation>> {
        self.inner.next_pending_evaluations(limit)
    }

    fn claim_evaluation(&self, id: EvaluationId) -> Result<bool> {
        self.inner.claim_evaluation(id)
    }

    fn finish_evaluation(&self, id: EvaluationId, outcome: &EvaluationOutcome) -> Result<()> {
        self.inner.finish_evaluation(id, outcome)
    }

    fn recover_interrupted_evaluations(&self, reason: &str) -> Result<Vec<EvaluationId>> {
        self.inner.recover_interrupted_evaluations(reason)
    }

    fn evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        self.inner.evaluation(id)
    }

    fn evaluations(&self) -> Result<Vec<Evaluation>> {
        self.inner.evaluations()
    }

    fn channels_with_completed_evaluations(&self) -> Result<Vec<ChannelName>> {
        self.inner.channels_with_completed_evaluations()
    }

    fn latest_channel_snapshot(&self, channel: &ChannelName) -> Result<Option<ChannelSnapshot>> {
        self.inner.latest_channel_snapshot(channel)
    }

    fn upsert_cve_batch(
        &self,
        records: &[CveRecord],
        checkpoint: Option<(&str, DateTime<Utc>)>,
    ) -> Result<CveBatchOutcome> {
        let call = self.cve_batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_cve_batch_at == Some(call) {
            anyhow::bail!("injected failure on CVE batch {}", call);
        }
        self.inner.upsert_cve_batch(records, checkpoint)
    }

    fn cve_record(&self, id: &CveId) -> Result<Option<CveRecord>> {
        self.inner.cve_record(id)
    }

    fn cve_count(&self) -> Result<usize> {
        self.inner.cve_count()
    }

    fn checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.checkpoint(name)
    }

    fn rebuild_suggestions(
        &self,
        key: &RecomputeKey,
        compute: &SuggestionComputer<'_>,
    ) -> Result<RebuildSummary> {
        self.rebuild_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_rebuilds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("injected failure rebuilding {}", key);
        }
        if !self.rebuild_delay.is_zero() {
            std::thread::sleep(self.rebuild_delay);
        }

        let compute_delay = Duration::from_millis(self.compute_delay_ms.load(Ordering::SeqCst));
        self.inner.rebuild_suggestions(key, &|snapshot, cves| {
            if !compute_delay.is_zero() {
                std::thread::sleep(compute_delay);
            }
            compute(snapshot, cves)
        })
    }

    fn suggestions_for(&self, key: &RecomputeKey) -> Result<Vec<StoredSuggestion>> {
        self.inner.suggestions_for(key)
    }

    fn suggestion_count(&self) -> Result<usize> {
        self.inner.suggestion_count()
    }

    fn pending_changes(&self, limit: usize) -> Result<Vec<PendingChange>> {
        self.inner.pending_changes(limit)
    }

    fn ack_changes(&self, sequences: &[i64]) -> Result<()> {
        self.inner.ack_changes(sequences)
    }

    fn commit_signal(&self) -> Arc<Notify> {
        self.inner.commit_signal()
    }
}
