use super::store_task;
use crate::application::dto::{EvaluationRunReport, WorkOutcome};
use crate::ports::outbound::{ChangeConsumer, Evaluator, SourceMirror, TrackerStore};
use crate::shared::error::TrackerError;
use crate::shared::Result;
use crate::tracking::domain::{ChangeEvent, Evaluation, EvaluationId, EvaluationOutcome};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// Worker pool limits of the evaluation scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Evaluations allowed to hold the evaluator at the same time
    pub max_workers: usize,
    /// Wall-clock limit of one evaluator invocation
    pub timeout: Duration,
    /// How long an evaluation whose source sync failed is left alone, and
    /// how often idle workers poll for work
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            timeout: Duration::from_secs(3600),
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// EvaluationScheduler - Bounded worker pool driving the evaluation state machine
///
/// New-revision events become PENDING evaluations. Each of `max_workers`
/// slots repeatedly takes the oldest PENDING evaluation not held by another
/// slot, makes its revision available in the source mirror, claims it
/// (PENDING -> RUNNING) and runs the evaluator under a timeout. The result
/// is written as COMPLETED or FAILED; no evaluation is retried once
/// terminal.
///
/// # Type Parameters
/// * `S` - TrackerStore implementation
/// * `M` - SourceMirror implementation
/// * `E` - Evaluator implementation
pub struct EvaluationScheduler<S, M, E> {
    store: Arc<S>,
    mirror: Arc<M>,
    evaluator: Arc<E>,
    config: SchedulerConfig,
    /// PENDING evaluations currently being prepared by a slot
    reservations: DashSet<EvaluationId>,
    /// Evaluations whose source sync failed, with the time they become eligible again
    deferred: DashMap<EvaluationId, Instant>,
    work_available: Notify,
}

/// Releases a slot's hold on a PENDING evaluation when dropped
struct Reservation<'a> {
    evaluation: Evaluation,
    held: &'a DashSet<EvaluationId>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.held.remove(&self.evaluation.id);
    }
}

impl<S, M, E> EvaluationScheduler<S, M, E>
where
    S: TrackerStore + 'static,
    M: SourceMirror,
    E: Evaluator,
{
    /// Creates a new EvaluationScheduler with injected dependencies
    pub fn new(store: Arc<S>, mirror: Arc<M>, evaluator: Arc<E>, config: SchedulerConfig) -> Self {
        Self {
            store,
            mirror,
            evaluator,
            config,
            reservations: DashSet::new(),
            deferred: DashMap::new(),
            work_available: Notify::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs every currently runnable PENDING evaluation and returns when none is left
    ///
    /// Evaluations deferred by a failed source sync stay PENDING and are
    /// reported as deferred.
    pub async fn drain(&self) -> Result<EvaluationRunReport> {
        let slots = (0..self.config.max_workers).map(|slot| self.drain_slot(slot));

        let mut report = EvaluationRunReport::default();
        for result in join_all(slots).await {
            report.merge(result?);
        }
        Ok(report)
    }

    async fn drain_slot(&self, slot: usize) -> Result<EvaluationRunReport> {
        let mut report = EvaluationRunReport::default();
        while let Some(outcome) = self.work_one().await? {
            debug!(slot, outcome = ?outcome, "Worker slot finished an evaluation");
            report.record(outcome);
        }
        Ok(report)
    }

    /// Runs the worker slots until `shutdown` flips to true
    ///
    /// Idle slots wake up when a new evaluation is scheduled or after the
    /// retry delay. Evaluations in flight at shutdown are abandoned and stay
    /// RUNNING until crash recovery fails them.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.max_workers,
            timeout_secs = self.config.timeout.as_secs(),
            "Evaluation workers started"
        );
        let slots = (0..self.config.max_workers).map(|slot| self.run_slot(slot, shutdown.clone()));
        join_all(slots).await;
        info!("Evaluation workers stopped");
    }

    async fn run_slot(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.work_one() => match result {
                    Ok(Some(_)) => false,
                    Ok(None) => true,
                    Err(e) => {
                        error!(slot, error = %format!("{:#}", e), "Evaluation worker error");
                        true
                    }
                },
            };

            if idle {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = self.work_available.notified() => {}
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }
    }

    /// Picks up and runs one PENDING evaluation
    ///
    /// # Returns
    /// `None` when no runnable PENDING evaluation exists
    pub async fn work_one(&self) -> Result<Option<WorkOutcome>> {
        let Some(reservation) = self.reserve_next().await? else {
            return Ok(None);
        };
        self.run_evaluation(&reservation.evaluation).await.map(Some)
    }

    /// Reserves the oldest PENDING evaluation that no slot holds and that
    /// is not waiting out a sync failure
    async fn reserve_next(&self) -> Result<Option<Reservation<'_>>> {
        let now = Instant::now();
        self.deferred.retain(|_, eligible_at| *eligible_at > now);

        // Every skipped candidate is reserved or deferred, and at most one
        // reservation per other slot can land while the query runs, so this
        // window always reaches the first free one.
        let window =
            self.config.max_workers.max(1) + self.reservations.len() + self.deferred.len();
        let candidates =
            store_task::run(&self.store, move |store| store.next_pending_evaluations(window))
                .await?;
        for evaluation in candidates {
            if self.deferred.contains_key(&evaluation.id) {
                continue;
            }
            if self.reservations.insert(evaluation.id) {
                return Ok(Some(Reservation {
                    evaluation,
                    held: &self.reservations,
                }));
            }
        }
        Ok(None)
    }

    async fn run_evaluation(&self, evaluation: &Evaluation) -> Result<WorkOutcome> {
        let id = evaluation.id;
        let revision = &evaluation.revision;

        // Step 1: Make the revision available and check it out
        let checkout = match self.prepare_checkout(evaluation).await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    evaluation_id = %id,
                    channel = %evaluation.channel,
                    revision = %revision,
                    retry_in_secs = self.config.retry_delay.as_secs(),
                    error = %format!("{:#}", e),
                    "Source sync failed, evaluation stays pending"
                );
                self.deferred
                    .insert(id, Instant::now() + self.config.retry_delay);
                return Ok(WorkOutcome::Deferred(id));
            }
        };

        // Step 2: Claim the evaluation (PENDING -> RUNNING)
        let claim = store_task::run(&self.store, move |store| store.claim_evaluation(id)).await;
        let claimed = match claim {
            Ok(claimed) => claimed,
            Err(e) => {
                self.release(&checkout).await;
                return Err(e);
            }
        };
        if !claimed {
            debug!(evaluation_id = %id, "Evaluation was claimed elsewhere");
            self.release(&checkout).await;
            return Ok(WorkOutcome::Lost(id));
        }
        info!(
            evaluation_id = %id,
            channel = %evaluation.channel,
            revision = %revision,
            "Evaluation started"
        );

        // Step 3: Run the evaluator under the timeout
        let started = Instant::now();
        let evaluated =
            tokio::time::timeout(self.config.timeout, self.evaluator.evaluate(&checkout, revision))
                .await;
        self.release(&checkout).await;

        let outcome = match evaluated {
            Ok(Ok(snapshot)) => EvaluationOutcome::Completed(snapshot),
            Ok(Err(e)) => EvaluationOutcome::Failed(format!("{:#}", e)),
            Err(_) => EvaluationOutcome::Failed(
                TrackerError::EvaluationTimedOut {
                    revision: revision.to_string(),
                    seconds: self.config.timeout.as_secs(),
                }
                .to_string(),
            ),
        };

        // Step 4: Record the terminal state
        let outcome = store_task::run(&self.store, move |store| {
            store.finish_evaluation(id, &outcome)?;
            Ok(outcome)
        })
        .await?;
        let elapsed_secs = started.elapsed().as_secs();
        match &outcome {
            EvaluationOutcome::Completed(snapshot) => {
                info!(
                    evaluation_id = %id,
                    channel = %evaluation.channel,
                    revision = %revision,
                    derivations = snapshot.len(),
                    elapsed_secs,
                    "Evaluation completed"
                );
                Ok(WorkOutcome::Completed(id))
            }
            EvaluationOutcome::Failed(reason) => {
                warn!(
                    evaluation_id = %id,
                    channel = %evaluation.channel,
                    revision = %revision,
                    elapsed_secs,
                    error = %reason,
                    "Evaluation failed"
                );
                Ok(WorkOutcome::Failed(id))
            }
        }
    }

    async fn prepare_checkout(&self, evaluation: &Evaluation) -> Result<std::path::PathBuf> {
        self.mirror
            .ensure_revision_available(&evaluation.revision)
            .await?;
        self.mirror.checkout(&evaluation.revision).await
    }

    async fn release(&self, checkout: &Path) {
        if let Err(e) = self.mirror.release(checkout).await {
            warn!(
                checkout = %checkout.display(),
                error = %format!("{:#}", e),
                "Failed to remove evaluation checkout"
            );
        }
    }

    fn wake_workers(&self) {
        self.work_available.notify_waiters();
        // Keeps a permit for a slot that is between its queue check and its wait.
        self.work_available.notify_one();
    }
}

#[async_trait]
impl<S, M, E> ChangeConsumer for EvaluationScheduler<S, M, E>
where
    S: TrackerStore + 'static,
    M: SourceMirror,
    E: Evaluator,
{
    fn name(&self) -> &'static str {
        "evaluation-scheduler"
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<()> {
        let ChangeEvent::NewRevision { channel, revision } = event else {
            return Ok(());
        };

        let (pair_channel, pair_revision) = (channel.clone(), revision.clone());
        let created = store_task::run(&self.store, move |store| {
            store.create_pending_evaluation(&pair_channel, &pair_revision)
        })
        .await?;
        match created {
            Some(id) => {
                info!(
                    evaluation_id = %id,
                    channel = %channel,
                    revision = %revision,
                    "Evaluation scheduled"
                );
                self.wake_workers();
            }
            None => debug!(
                channel = %channel,
                revision = %revision,
                "Evaluation already recorded for revision"
            ),
        }
        Ok(())
    }
}
