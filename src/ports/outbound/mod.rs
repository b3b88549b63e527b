/// Outbound ports (Driven ports) - Infrastructure interfaces
///
/// These ports define the interfaces that the application core uses
/// to interact with external systems (feeds, git, the Nix evaluator,
/// the data store, the console).
pub mod change_consumer;
pub mod channel_feed;
pub mod cve_feed;
pub mod evaluator;
pub mod progress_reporter;
pub mod source_mirror;
pub mod tracker_store;

pub use change_consumer::ChangeConsumer;
pub use channel_feed::{ChannelFeed, ChannelMetric};
pub use cve_feed::{CveDocumentStream, CveFeed, RawCveDocument};
pub use evaluator::Evaluator;
pub use progress_reporter::ProgressReporter;
pub use source_mirror::SourceMirror;
pub use tracker_store::{
    CveBatchOutcome, SuggestionComputer, TrackerStore, CVE_DELTA_CHECKPOINT,
};
