use super::store_task;
use crate::application::dto::DrainReport;
use crate::ports::outbound::{ChangeConsumer, TrackerStore};
use crate::shared::Result;
use crate::tracking::domain::ChangeEvent;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Outbox events handed to the consumers per delivery batch
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// ChangeNotifier - Delivers committed change events to their consumers
///
/// Events are read from the store's outbox in commit order, so a consumer
/// never sees an event whose mutation has not committed. An event is
/// acknowledged only after every consumer accepted its batch; a failing
/// consumer stops the pass and the batch is delivered again next time,
/// which makes delivery at-least-once.
///
/// # Type Parameters
/// * `S` - TrackerStore implementation
pub struct ChangeNotifier<S> {
    store: Arc<S>,
    consumers: Vec<Arc<dyn ChangeConsumer>>,
    batch_size: usize,
    poll_interval: Duration,
}

impl<S> ChangeNotifier<S>
where
    S: TrackerStore + 'static,
{
    /// Creates a new ChangeNotifier delivering to `consumers` in the given order
    pub fn new(store: Arc<S>, consumers: Vec<Arc<dyn ChangeConsumer>>) -> Self {
        Self {
            store,
            consumers,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(30),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fallback wake-up interval of [`ChangeNotifier::run`] when no commit is signalled
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Delivers every pending event and returns once the outbox is empty
    ///
    /// # Errors
    /// Returns the first consumer or store error; events of the failing
    /// batch stay pending.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        loop {
            let batch_size = self.batch_size;
            let pending =
                store_task::run(&self.store, move |store| store.pending_changes(batch_size)).await?;
            if pending.is_empty() {
                break;
            }

            let events: Vec<ChangeEvent> = pending.iter().map(|p| p.event.clone()).collect();
            for consumer in &self.consumers {
                debug!(consumer = consumer.name(), events = events.len(), "Delivering change events");
                consumer.on_changes(&events).await.with_context(|| {
                    format!(
                        "Change consumer '{}' failed; {} event(s) stay pending",
                        consumer.name(),
                        events.len()
                    )
                })?;
            }

            let sequences: Vec<i64> = pending.iter().map(|p| p.sequence).collect();
            let acked = sequences.len();
            store_task::run(&self.store, move |store| store.ack_changes(&sequences)).await?;
            report.delivered += acked;
            report.batches += 1;
        }

        if report.delivered > 0 {
            info!(
                delivered = report.delivered,
                batches = report.batches,
                "Change events delivered"
            );
        }
        Ok(report)
    }

    /// Drains the outbox after every signalled commit until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let committed = self.store.commit_signal();
        info!(
            consumers = self.consumers.len(),
            "Change notifier started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            // An interrupted pass leaves its batch unacknowledged
            tokio::select! {
                _ = shutdown.changed() => break,
                drained = self.drain_once() => {
                    if let Err(e) = drained {
                        error!(error = %format!("{:#}", e), "Change delivery failed, retrying later");
                    }
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = committed.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Change notifier stopped");
    }
}
