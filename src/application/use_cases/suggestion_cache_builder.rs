use super::store_task;
use crate::application::dto::RegenerateReport;
use crate::ports::outbound::{ChangeConsumer, ProgressReporter, TrackerStore};
use crate::shared::Result;
use crate::tracking::domain::{ChangeEvent, RebuildSummary, RecomputeKey};
use crate::tracking::services::SuggestionBuilder;
use anyhow::Context;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// CVE-changed events in one batch above which every channel is rebuilt
/// instead of every CVE
pub const CHANNEL_REBUILD_THRESHOLD: usize = 64;

/// Result of one recompute request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeStatus {
    /// The request ran the rebuild (and any passes coalesced into it)
    Rebuilt(RebuildSummary),
    /// A rebuild of the same key was in flight; it runs one more pass
    Coalesced,
}

#[derive(Debug, Default)]
struct FlightState {
    rerun: bool,
}

/// An in-flight rebuild of one key; the key is released when dropped
struct Flight<'a> {
    key: RecomputeKey,
    flights: &'a DashMap<RecomputeKey, FlightState>,
    finished: bool,
}

impl Flight<'_> {
    /// Ends the flight unless a rerun was requested meanwhile, in which case
    /// the request is consumed and `false` returned
    fn try_finish(&mut self) -> bool {
        if self
            .flights
            .remove_if(&self.key, |_, state| !state.rerun)
            .is_some()
        {
            self.finished = true;
            return true;
        }
        if let Some(mut state) = self.flights.get_mut(&self.key) {
            state.rerun = false;
        }
        false
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.flights.remove(&self.key);
        }
    }
}

/// SuggestionCacheBuilder - Keeps the suggestion cache in step with its inputs
///
/// Rebuilds are keyed by CVE or by channel and single-flighted: a request
/// for a key that is already being rebuilt sets a rerun flag instead of
/// starting a parallel rebuild, and the running flight performs exactly
/// one more pass before it ends.
///
/// # Type Parameters
/// * `S` - TrackerStore implementation
pub struct SuggestionCacheBuilder<S> {
    store: Arc<S>,
    builder: Arc<SuggestionBuilder>,
    flights: DashMap<RecomputeKey, FlightState>,
}

impl<S> SuggestionCacheBuilder<S>
where
    S: TrackerStore + 'static,
{
    /// Creates a new SuggestionCacheBuilder with injected dependencies
    pub fn new(store: Arc<S>, builder: SuggestionBuilder) -> Self {
        Self {
            store,
            builder: Arc::new(builder),
            flights: DashMap::new(),
        }
    }

    /// Rebuilds the suggestions of `key`, or coalesces into the rebuild already in flight
    pub async fn recompute(&self, key: RecomputeKey) -> Result<RecomputeStatus> {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(mut flight) => {
                flight.get_mut().rerun = true;
                debug!(key = %key, "Coalesced suggestion rebuild into the one in flight");
                return Ok(RecomputeStatus::Coalesced);
            }
            Entry::Vacant(slot) => {
                slot.insert(FlightState::default());
            }
        }

        let mut flight = Flight {
            key,
            flights: &self.flights,
            finished: false,
        };
        let mut passes = 0usize;
        let summary = loop {
            passes += 1;
            let result = self.rebuild(&flight.key).await;
            if flight.try_finish() {
                break result?;
            }
            if let Err(e) = result {
                error!(key = %flight.key, error = %format!("{:#}", e), "Suggestion rebuild failed");
            }
            debug!(key = %flight.key, pass = passes + 1, "Running coalesced rebuild pass");
        };

        info!(
            key = %flight.key,
            removed = summary.removed,
            inserted = summary.inserted,
            passes,
            "Suggestions rebuilt"
        );
        Ok(RecomputeStatus::Rebuilt(summary))
    }

    /// One rebuild, off the async runtime
    async fn rebuild(&self, key: &RecomputeKey) -> Result<RebuildSummary> {
        let builder = Arc::clone(&self.builder);
        let task_key = key.clone();

        store_task::run(&self.store, move |store| {
            store.rebuild_suggestions(&task_key, &|snapshot, cves| {
                builder.suggest_all(snapshot, cves)
            })
        })
        .await
        .with_context(|| format!("Failed to rebuild suggestions for {}", key))
    }

    /// Forces a rebuild of every channel that has a COMPLETED evaluation
    ///
    /// A channel rebuild covers every CVE, so this regenerates the whole
    /// cache. Keys fail independently.
    pub async fn regenerate_all<PR: ProgressReporter>(
        &self,
        progress_reporter: &PR,
    ) -> Result<RegenerateReport> {
        let channels =
            store_task::run(&self.store, |store| store.channels_with_completed_evaluations())
                .await?;
        let total = channels.len();
        progress_reporter.report(&format!(
            "🔄 Regenerating suggestions for {} channel(s)...",
            total
        ));

        let mut report = RegenerateReport::default();
        for (index, channel) in channels.into_iter().enumerate() {
            let key = RecomputeKey::Channel(channel);
            match self.recompute(key.clone()).await {
                Ok(RecomputeStatus::Rebuilt(summary)) => {
                    report.rebuilt += 1;
                    report.removed += summary.removed;
                    report.inserted += summary.inserted;
                }
                Ok(RecomputeStatus::Coalesced) => report.coalesced += 1,
                Err(e) => {
                    error!(key = %key, error = %format!("{:#}", e), "Suggestion rebuild failed");
                    progress_reporter.report_error(&format!("❌ {}: {:#}", key, e));
                    report.failures.push((key, format!("{:#}", e)));
                }
            }
            progress_reporter.report_progress(index + 1, total, None);
        }

        progress_reporter.report_completion(&format!(
            "✅ Regenerated {} channel(s): {} suggestion(s) written, {} stale removed",
            report.rebuilt, report.inserted, report.removed
        ));
        Ok(report)
    }

    /// Keys affected by a batch of events, in first-seen order
    ///
    /// Above `CHANNEL_REBUILD_THRESHOLD` changed CVEs the CVE keys are
    /// replaced by one key per evaluated channel.
    async fn keys_for(&self, events: &[ChangeEvent]) -> Result<Vec<RecomputeKey>> {
        let mut channels = Vec::new();
        let mut cves = Vec::new();
        let mut seen = HashSet::new();

        for event in events {
            let key = match event {
                ChangeEvent::CveChanged { cve_id } => RecomputeKey::Cve(cve_id.clone()),
                ChangeEvent::EvaluationCompleted { channel, .. } => {
                    RecomputeKey::Channel(channel.clone())
                }
                ChangeEvent::NewRevision { .. } => continue,
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            match key {
                RecomputeKey::Channel(_) => channels.push(key),
                RecomputeKey::Cve(_) => cves.push(key),
            }
        }

        if cves.len() <= CHANNEL_REBUILD_THRESHOLD {
            channels.extend(cves);
            return Ok(channels);
        }

        info!(
            changed_cves = cves.len(),
            "Many CVEs changed at once, rebuilding per channel"
        );
        let evaluated =
            store_task::run(&self.store, |store| store.channels_with_completed_evaluations())
                .await?;
        for channel in evaluated {
            let key = RecomputeKey::Channel(channel);
            if seen.insert(key.clone()) {
                channels.push(key);
            }
        }
        Ok(channels)
    }
}

#[async_trait]
impl<S> ChangeConsumer for SuggestionCacheBuilder<S>
where
    S: TrackerStore + 'static,
{
    fn name(&self) -> &'static str {
        "suggestion-cache-builder"
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<()> {
        self.on_changes(std::slice::from_ref(event)).await
    }

    /// Rebuilds every affected key; a failing key does not stop the others
    /// but fails the batch so that it is delivered again
    async fn on_changes(&self, events: &[ChangeEvent]) -> Result<()> {
        let mut failures = Vec::new();
        for key in self.keys_for(events).await? {
            if let Err(e) = self.recompute(key.clone()).await {
                error!(key = %key, error = %format!("{:#}", e), "Suggestion rebuild failed");
                failures.push(format!("{}: {:#}", key, e));
            }
        }

        if !failures.is_empty() {
            anyhow::bail!(
                "{} suggestion rebuild(s) failed: {}",
                failures.len(),
                failures.join("; ")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::persistence::SqliteTrackerStore;
    use crate::tracking::domain::{
        AffectedProduct, ChannelName, ChannelObservation, CveId, CveRecord, Derivation,
        EvaluationOutcome, PackageSnapshot, Revision, Severity, VersionStatus,
    };
    use chrono::{TimeZone, Utc};

    fn cve(id: &str, product: &str, day: u32) -> CveRecord {
        CveRecord {
            id: CveId::new(id.to_string()).unwrap(),
            published: None,
            last_modified: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
            title: None,
            description: format!("{} issue", product),
            severity: Severity::High,
            score: None,
            affected: vec![AffectedProduct {
                vendor: None,
                product: Some(product.to_string()),
                package_name: None,
                default_status: VersionStatus::Affected,
                versions: Vec::new(),
            }],
        }
    }

    fn derivation(attribute: &str, name: &str) -> Derivation {
        Derivation {
            attribute: attribute.to_string(),
            name: name.to_string(),
            system: "x86_64-linux".to_string(),
            drv_path: format!("/nix/store/xyz-{}.drv", name),
            description: None,
            position: None,
            maintainers: Vec::new(),
        }
    }

    /// Seeds a channel with a COMPLETED evaluation holding `derivations`
    fn seed_evaluated_channel(store: &SqliteTrackerStore, channel: &str, derivations: Vec<Derivation>) {
        let observation =
            ChannelObservation::new(channel.to_string(), "abc123".to_string(), "rolling", None)
                .unwrap();
        store.record_channel_observation(&observation).unwrap();
        let id = store
            .create_pending_evaluation(
                &ChannelName::new(channel.to_string()).unwrap(),
                &Revision::new("abc123".to_string()).unwrap(),
            )
            .unwrap()
            .unwrap();
        assert!(store.claim_evaluation(id).unwrap());
        store
            .finish_evaluation(id, &EvaluationOutcome::Completed(PackageSnapshot::new(derivations)))
            .unwrap();
    }

    fn cache_builder(store: &Arc<SqliteTrackerStore>) -> SuggestionCacheBuilder<SqliteTrackerStore> {
        SuggestionCacheBuilder::new(
            Arc::clone(store),
            SuggestionBuilder::new(1000, "https://github.com/NixOS/nixpkgs"),
        )
    }

    fn channel_key(name: &str) -> RecomputeKey {
        RecomputeKey::Channel(ChannelName::new(name.to_string()).unwrap())
    }

    #[tokio::test]
    async fn test_cve_changed_event_rebuilds_that_cve() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        seed_evaluated_channel(&store, "nixos-unstable", vec![derivation("hello", "hello-2.12.1")]);
        store
            .upsert_cve_batch(&[cve("CVE-2024-1000", "hello", 1)], None)
            .unwrap();
        let builder = cache_builder(&store);

        let event = ChangeEvent::CveChanged {
            cve_id: CveId::new("CVE-2024-1000".to_string()).unwrap(),
        };
        builder.on_change(&event).await.unwrap();

        let rows = store.suggestions_for(&channel_key("nixos-unstable")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].suggestion.package, "hello");
    }

    #[tokio::test]
    async fn test_recompute_replaces_stale_rows() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        seed_evaluated_channel(&store, "nixos-unstable", vec![derivation("hello", "hello-2.12.1")]);
        store
            .upsert_cve_batch(&[cve("CVE-2024-1000", "hello", 1)], None)
            .unwrap();
        let builder = cache_builder(&store);
        builder.recompute(channel_key("nixos-unstable")).await.unwrap();

        store
            .upsert_cve_batch(&[cve("CVE-2024-1000", "openssl", 2)], None)
            .unwrap();
        let status = builder.recompute(channel_key("nixos-unstable")).await.unwrap();

        assert_eq!(
            status,
            RecomputeStatus::Rebuilt(RebuildSummary {
                removed: 1,
                inserted: 0
            })
        );
        assert_eq!(store.suggestion_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recompute_coalesces_while_in_flight() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        let builder = cache_builder(&store);
        let key = channel_key("nixos-unstable");
        builder
            .flights
            .insert(key.clone(), FlightState::default());

        let status = builder.recompute(key.clone()).await.unwrap();

        assert_eq!(status, RecomputeStatus::Coalesced);
        assert!(builder.flights.get(&key).unwrap().rerun);
    }

    #[tokio::test]
    async fn test_finished_flight_releases_key() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        let builder = cache_builder(&store);

        builder.recompute(channel_key("nixos-unstable")).await.unwrap();

        assert!(builder.flights.is_empty());
    }

    #[tokio::test]
    async fn test_large_cve_batch_rebuilds_per_channel() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        seed_evaluated_channel(&store, "nixos-unstable", vec![derivation("hello", "hello-2.12.1")]);
        let builder = cache_builder(&store);
        let events: Vec<ChangeEvent> = (0..=CHANNEL_REBUILD_THRESHOLD)
            .map(|n| ChangeEvent::CveChanged {
                cve_id: CveId::new(format!("CVE-2024-{:04}", 1000 + n)).unwrap(),
            })
            .collect();

        let keys = builder.keys_for(&events).await.unwrap();

        assert_eq!(keys, vec![channel_key("nixos-unstable")]);
    }

    #[tokio::test]
    async fn test_small_batch_keeps_cve_keys_after_channel_keys() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        let builder = cache_builder(&store);
        let cve_id = CveId::new("CVE-2024-1000".to_string()).unwrap();
        let events = vec![
            ChangeEvent::CveChanged {
                cve_id: cve_id.clone(),
            },
            ChangeEvent::EvaluationCompleted {
                evaluation_id: crate::tracking::domain::EvaluationId(1),
                channel: ChannelName::new("nixos-unstable".to_string()).unwrap(),
            },
            ChangeEvent::CveChanged {
                cve_id: cve_id.clone(),
            },
        ];

        let keys = builder.keys_for(&events).await.unwrap();

        assert_eq!(
            keys,
            vec![channel_key("nixos-unstable"), RecomputeKey::Cve(cve_id)]
        );
    }
}
