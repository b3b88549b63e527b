use crate::ports::outbound::TrackerStore;
use crate::shared::Result;
use crate::tracking::domain::EvaluationId;
use std::sync::Arc;
use tracing::warn;

/// Error recorded on evaluations found RUNNING without a live worker
pub const INTERRUPTED_REASON: &str = "interrupted: evaluator process did not finish";

/// RecoverEvaluationsUseCase - Fails evaluations orphaned by a crashed process
///
/// Must only run while no worker pool is active, e.g. at daemon start.
pub struct RecoverEvaluationsUseCase<S> {
    store: Arc<S>,
}

impl<S> RecoverEvaluationsUseCase<S>
where
    S: TrackerStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Transitions every RUNNING evaluation to FAILED
    ///
    /// # Returns
    /// Identifiers of the recovered evaluations
    pub fn execute(&self) -> Result<Vec<EvaluationId>> {
        let recovered = self
            .store
            .recover_interrupted_evaluations(INTERRUPTED_REASON)?;
        for id in &recovered {
            warn!(evaluation_id = %id, "Marked interrupted evaluation as failed");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::persistence::SqliteTrackerStore;
    use crate::tracking::domain::{ChannelName, ChannelObservation, EvaluationState, Revision};

    #[test]
    fn test_running_evaluations_are_failed() {
        let store = Arc::new(SqliteTrackerStore::open_in_memory().unwrap());
        let observation = ChannelObservation::new(
            "nixos-unstable".to_string(),
            "aaa111".to_string(),
            "rolling",
            None,
        )
        .unwrap();
        store.record_channel_observation(&observation).unwrap();
        let channel = ChannelName::new("nixos-unstable".to_string()).unwrap();
        let running = store
            .create_pending_evaluation(&channel, &Revision::new("aaa111".to_string()).unwrap())
            .unwrap()
            .unwrap();
        let pending = store
            .create_pending_evaluation(&channel, &Revision::new("bbb222".to_string()).unwrap())
            .unwrap()
            .unwrap();
        assert!(store.claim_evaluation(running).unwrap());

        let recovered = RecoverEvaluationsUseCase::new(Arc::clone(&store))
            .execute()
            .unwrap();

        assert_eq!(recovered, vec![running]);
        let failed = store.evaluation(running).unwrap().unwrap();
        assert_eq!(failed.state, EvaluationState::Failed);
        assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_REASON));
        assert_eq!(
            store.evaluation(pending).unwrap().unwrap().state,
            EvaluationState::Pending
        );
    }
}
