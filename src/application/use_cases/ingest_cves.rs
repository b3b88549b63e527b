use crate::application::dto::{IngestMode, IngestReport};
use crate::ports::outbound::{
    CveDocumentStream, CveFeed, ProgressReporter, RawCveDocument, TrackerStore,
    CVE_DELTA_CHECKPOINT,
};
use crate::shared::Result;
use crate::tracking::domain::CveRecord;
use crate::tracking::services::parse_cve_record;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Documents requested per feed chunk, and so the most records committed
/// per store transaction
const BATCH_SIZE: usize = 500;

/// IngestCvesUseCase - Reads CVE records from the feed into the store
///
/// Documents arrive in chunks and each chunk is parsed and committed as
/// its own batch, so memory stays bounded by two chunks. Malformed
/// documents are skipped individually. The delta checkpoint is written
/// together with the last batch, so an interrupted run leaves the
/// checkpoint where it was and the next delta run re-reads the whole
/// window.
///
/// # Type Parameters
/// * `F` - CveFeed implementation
/// * `S` - TrackerStore implementation
/// * `PR` - ProgressReporter implementation
pub struct IngestCvesUseCase<F, S, PR> {
    feed: F,
    store: Arc<S>,
    progress_reporter: PR,
}

impl<F, S, PR> IngestCvesUseCase<F, S, PR>
where
    F: CveFeed,
    S: TrackerStore,
    PR: ProgressReporter,
{
    /// Creates a new IngestCvesUseCase with injected dependencies
    pub fn new(feed: F, store: Arc<S>, progress_reporter: PR) -> Self {
        Self {
            feed,
            store,
            progress_reporter,
        }
    }

    /// Ingests the records modified since the last committed checkpoint
    pub async fn ingest_delta(&self) -> Result<IngestReport> {
        let since = self.store.checkpoint(CVE_DELTA_CHECKPOINT)?;
        match since {
            Some(since) => self
                .progress_reporter
                .report(&format!("📖 Reading CVE records modified since {}...", since)),
            None => self
                .progress_reporter
                .report("📖 No checkpoint yet, reading every CVE record..."),
        }

        let chunks = self.feed.fetch_changed_since(since, BATCH_SIZE).await?;
        self.ingest(IngestMode::Delta, chunks, true).await
    }

    /// Ingests the full corpus, optionally capped at `limit` documents
    ///
    /// Only an uncapped run advances the delta checkpoint.
    pub async fn ingest_bulk(&self, limit: Option<usize>) -> Result<IngestReport> {
        self.progress_reporter.report("📖 Reading the full CVE corpus...");
        let chunks = self.feed.fetch_all(limit, BATCH_SIZE).await?;
        self.ingest(IngestMode::Bulk { limit }, chunks, limit.is_none())
            .await
    }

    async fn ingest(
        &self,
        mode: IngestMode,
        mut chunks: CveDocumentStream,
        advance_checkpoint: bool,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::new(mode);
        let mut newest: Option<DateTime<Utc>> = None;
        let mut batches = 0usize;
        // The newest parsed batch waits for the next chunk, because only
        // the last batch of the run may carry the checkpoint.
        let mut held: Option<Vec<CveRecord>> = None;

        // Step 1: Parse each chunk as it arrives and commit the one before it
        while let Some(documents) = chunks.try_next().await? {
            report.fetched += documents.len();
            let records = self.parse_all(&documents, &mut report);
            drop(documents);
            if records.is_empty() {
                continue;
            }

            newest = newest.max(records.iter().map(|r| r.last_modified).max());
            if let Some(previous) = held.replace(records) {
                batches += 1;
                self.commit_batch(&previous, None, batches, &mut report)?;
            }
        }

        // Step 2: Commit the last batch together with the checkpoint
        let checkpoint = newest.filter(|_| advance_checkpoint);
        if let Some(last) = held {
            batches += 1;
            let last_checkpoint = checkpoint.map(|at| (CVE_DELTA_CHECKPOINT, at));
            self.commit_batch(&last, last_checkpoint, batches, &mut report)?;
        }

        report.checkpoint = checkpoint;
        self.summarize(&report, checkpoint);
        Ok(report)
    }

    fn commit_batch(
        &self,
        batch: &[CveRecord],
        checkpoint: Option<(&str, DateTime<Utc>)>,
        number: usize,
        report: &mut IngestReport,
    ) -> Result<()> {
        let outcome = self.store.upsert_cve_batch(batch, checkpoint)?;
        report.inserted += outcome.inserted;
        report.updated += outcome.updated;
        report.skipped += outcome.skipped;

        debug!(
            batch = number,
            records = batch.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            checkpoint = checkpoint.is_some(),
            "Committed CVE batch"
        );
        self.progress_reporter.report(&format!(
            "💾 Committed batch {} ({} document(s) read so far)",
            number, report.fetched
        ));
        Ok(())
    }

    fn parse_all(&self, documents: &[RawCveDocument], report: &mut IngestReport) -> Vec<CveRecord> {
        documents
            .iter()
            .filter_map(|document| {
                match parse_cve_record(&document.origin, &document.content) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(
                            origin = %document.origin,
                            error = %format!("{:#}", e),
                            "Skipping malformed CVE record"
                        );
                        report.malformed += 1;
                        None
                    }
                }
            })
            .collect()
    }

    fn summarize(&self, report: &IngestReport, checkpoint: Option<DateTime<Utc>>) {
        info!(
            mode = %report.mode,
            fetched = report.fetched,
            malformed = report.malformed,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            checkpoint = ?checkpoint,
            "CVE ingestion finished"
        );
        if report.malformed > 0 {
            self.progress_reporter.report_error(&format!(
                "⚠️  Skipped {} malformed CVE record(s)",
                report.malformed
            ));
        }
        self.progress_reporter.report_completion(&format!(
            "✅ Ingested {} CVE document(s) ({}): {} new, {} updated, {} unchanged",
            report.fetched, report.mode, report.inserted, report.updated, report.skipped
        ));
    }
}
