use crate::application::dto::FetchReport;
use crate::ports::outbound::{ChannelFeed, ChannelMetric, ProgressReporter, TrackerStore};
use crate::shared::Result;
use crate::tracking::domain::{ChannelName, ChannelObservation};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// FetchChannelsUseCase - Records the channel revisions published by the
/// monitoring feed
///
/// Each tuple is upserted in its own transaction, so a failing tuple never
/// leaves partial channel state and never blocks the others. The store
/// emits a new-revision event when the (channel, revision) pair is new.
///
/// # Type Parameters
/// * `F` - ChannelFeed implementation
/// * `S` - TrackerStore implementation
/// * `PR` - ProgressReporter implementation
pub struct FetchChannelsUseCase<F, S, PR> {
    feed: F,
    store: Arc<S>,
    progress_reporter: PR,
}

impl<F, S, PR> FetchChannelsUseCase<F, S, PR>
where
    F: ChannelFeed,
    S: TrackerStore,
    PR: ProgressReporter,
{
    /// Creates a new FetchChannelsUseCase with injected dependencies
    pub fn new(feed: F, store: Arc<S>, progress_reporter: PR) -> Self {
        Self {
            feed,
            store,
            progress_reporter,
        }
    }

    /// Executes one fetch of every channel
    ///
    /// # Errors
    /// Returns an error only when the feed itself cannot be read; per-tuple
    /// failures are counted in the report.
    pub async fn execute(&self) -> Result<FetchReport> {
        // Step 1: Read the monitoring feed
        self.progress_reporter.report(&format!(
            "📡 Fetching channel revisions from {}...",
            self.feed.describe()
        ));
        let metrics = self.feed.fetch_channel_metrics().await?;
        let mut report = FetchReport {
            observed: metrics.len(),
            ..FetchReport::default()
        };

        // Step 2: Validate tuples
        let observations = Self::validate(metrics, &mut report);

        // Step 3: Upsert channels one transaction at a time
        for observation in &observations {
            self.record(observation, &mut report);
        }

        // Step 4: Summarize
        if report.has_failures() {
            self.progress_reporter.report_error(&format!(
                "⚠️  {} channel observation(s) could not be recorded",
                report.failed
            ));
        }
        self.progress_reporter.report_completion(&format!(
            "✅ Recorded {} channel(s): {} new, {} revision change(s), {} evaluation(s) scheduled",
            observations.len() - report.failed,
            report.created,
            report.revision_changed,
            report.scheduled
        ));

        Ok(report)
    }

    /// Turns raw tuples into observations, keeping the first tuple of each
    /// channel name and skipping malformed ones
    fn validate(metrics: Vec<ChannelMetric>, report: &mut FetchReport) -> Vec<ChannelObservation> {
        let mut seen: HashSet<ChannelName> = HashSet::new();
        let mut observations = Vec::with_capacity(metrics.len());

        for (index, metric) in metrics.into_iter().enumerate() {
            let observation = match Self::to_observation(metric) {
                Ok(observation) => observation,
                Err(e) => {
                    warn!(index, error = %format!("{:#}", e), "Skipping malformed channel tuple");
                    report.skipped += 1;
                    continue;
                }
            };

            if !seen.insert(observation.name.clone()) {
                warn!(
                    channel = %observation.name,
                    revision = %observation.revision,
                    "Skipping repeated channel tuple"
                );
                report.skipped += 1;
                continue;
            }

            observations.push(observation);
        }

        observations
    }

    fn to_observation(metric: ChannelMetric) -> Result<ChannelObservation> {
        let ChannelMetric {
            channel,
            revision,
            status,
            variant,
        } = metric;
        let channel = channel.ok_or_else(|| anyhow::anyhow!("tuple has no channel name"))?;
        let revision = revision.ok_or_else(|| anyhow::anyhow!("tuple has no revision"))?;
        let status = status.ok_or_else(|| anyhow::anyhow!("tuple has no status"))?;
        ChannelObservation::new(channel, revision, &status, variant)
    }

    fn record(&self, observation: &ChannelObservation, report: &mut FetchReport) {
        match self.store.record_channel_observation(observation) {
            Ok(update) => {
                if update.created {
                    report.created += 1;
                }
                if update.revision_changed {
                    report.revision_changed += 1;
                    info!(
                        channel = %observation.name,
                        revision = %observation.revision,
                        status = %observation.status,
                        scheduled = update.scheduled,
                        "Channel revision changed"
                    );
                } else {
                    debug!(channel = %observation.name, "Channel revision unchanged");
                }
                if update.scheduled {
                    report.scheduled += 1;
                }
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    channel = %observation.name,
                    revision = %observation.revision,
                    error = %format!("{:#}", e),
                    "Failed to record channel observation"
                );
            }
        }
    }
}
