/// Domain model of the tracker: channels, evaluations, CVE records,
/// cached suggestions and the change events linking them.
pub mod change_event;
pub mod channel;
pub mod cve_record;
pub mod evaluation;
pub mod package_snapshot;
pub mod suggestion;

pub use change_event::{ChangeEvent, PendingChange};
pub use channel::{Channel, ChannelName, ChannelObservation, ChannelStatus, ChannelUpdate, Revision};
pub use cve_record::{
    AffectedProduct, CveId, CveRecord, CvssScore, Severity, VersionConstraint, VersionStatus,
};
pub use evaluation::{Evaluation, EvaluationId, EvaluationOutcome, EvaluationState};
pub use package_snapshot::{Derivation, Maintainer, PackageSnapshot};
pub use suggestion::{
    ChannelSnapshot, MatchBasis, RebuildSummary, RecomputeKey, StoredSuggestion, Suggestion,
    SuggestionPayload,
};
