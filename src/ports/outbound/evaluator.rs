use crate::shared::Result;
use crate::tracking::domain::{PackageSnapshot, Revision};
use async_trait::async_trait;
use std::path::Path;

/// Evaluator port for the external Nix evaluator
///
/// The evaluator is treated as a black box: given a checkout of a revision
/// it returns the package/derivation snapshot of that revision. Dropping
/// the returned future must abandon the evaluation, which is how the
/// scheduler enforces its timeout.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluates the package set checked out at `checkout`
    ///
    /// # Arguments
    /// * `checkout` - Root of an isolated checkout of `revision`
    /// * `revision` - The revision being evaluated, for error reporting
    ///
    /// # Errors
    /// Returns `TrackerError::EvaluationFailed` when the evaluator cannot be
    /// started, exits unsuccessfully, or produces unparseable output.
    async fn evaluate(&self, checkout: &Path, revision: &Revision) -> Result<PackageSnapshot>;
}
