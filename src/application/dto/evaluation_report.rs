use crate::tracking::domain::EvaluationId;

/// What a worker did with the evaluation it picked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Completed(EvaluationId),
    Failed(EvaluationId),
    /// Source sync failed; the evaluation stays PENDING until the retry delay passes
    Deferred(EvaluationId),
    /// Another worker claimed the evaluation first
    Lost(EvaluationId),
}

/// EvaluationRunReport - Result of draining the PENDING queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationRunReport {
    pub completed: Vec<EvaluationId>,
    pub failed: Vec<EvaluationId>,
    pub deferred: Vec<EvaluationId>,
}

impl EvaluationRunReport {
    pub fn record(&mut self, outcome: WorkOutcome) {
        match outcome {
            WorkOutcome::Completed(id) => self.completed.push(id),
            WorkOutcome::Failed(id) => self.failed.push(id),
            WorkOutcome::Deferred(id) => self.deferred.push(id),
            WorkOutcome::Lost(_) => {}
        }
    }

    pub fn merge(&mut self, other: EvaluationRunReport) {
        self.completed.extend(other.completed);
        self.failed.extend(other.failed);
        self.deferred.extend(other.deferred);
    }
}
