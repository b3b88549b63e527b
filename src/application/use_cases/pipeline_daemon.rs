use super::{ChangeNotifier, EvaluationScheduler};
use crate::ports::outbound::{Evaluator, SourceMirror, TrackerStore};
use crate::shared::Result;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// PipelineDaemon - Long-running composition of change delivery and evaluation
///
/// The change notifier and the evaluation worker pool run as separate
/// runtime tasks, so a slow consumer (a large suggestion rebuild) never
/// holds up the worker slots and the other way round.
///
/// # Type Parameters
/// * `S` - TrackerStore implementation
/// * `M` - SourceMirror implementation
/// * `E` - Evaluator implementation
pub struct PipelineDaemon<S, M, E> {
    notifier: ChangeNotifier<S>,
    scheduler: Arc<EvaluationScheduler<S, M, E>>,
}

impl<S, M, E> PipelineDaemon<S, M, E>
where
    S: TrackerStore + 'static,
    M: SourceMirror + 'static,
    E: Evaluator + 'static,
{
    pub fn new(notifier: ChangeNotifier<S>, scheduler: Arc<EvaluationScheduler<S, M, E>>) -> Self {
        Self {
            notifier,
            scheduler,
        }
    }

    /// Runs both tasks until `shutdown` flips to true and waits for them to stop
    ///
    /// # Errors
    /// Returns an error if either task panicked
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let notifier = self.notifier;
        let delivery_shutdown = shutdown.clone();
        let delivery = tokio::spawn(async move { notifier.run(delivery_shutdown).await });

        let scheduler = self.scheduler;
        let workers = tokio::spawn(async move { scheduler.run(shutdown).await });

        let (delivery, workers) = tokio::join!(delivery, workers);
        delivery.context("Change notifier task panicked")?;
        workers.context("Evaluation worker task panicked")?;
        info!("Pipeline stopped");
        Ok(())
    }
}
