//! nix-sectrack - CVE tracking pipeline for Nix channels
//!
//! This library fetches channel revisions and CVE records, evaluates each
//! new revision of the package set with an external Nix evaluator and keeps
//! an invalidation-driven cache of CVE-to-package suggestions. It follows a
//! hexagonal architecture.
//!
//! # Architecture
//!
//! The library is organized into the following layers:
//!
//! - **Domain Layer** (`tracking`): Domain models, version matching and the suggestion builder
//! - **Application Layer** (`application`): Use cases for each pipeline trigger
//! - **Ports** (`ports`): Interface definitions for infrastructure
//! - **Adapters** (`adapters`): Concrete implementations of ports
//! - **Shared** (`shared`): Common utilities and error types
//!
//! # Example
//!
//! ```no_run
//! use nix_sectrack::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(SqliteTrackerStore::open("nix-sectrack.sqlite3")?);
//!
//! // Record the current channel revisions
//! let feed = PrometheusChannelFeed::new(
//!     "https://prometheus.nixos.org/api/v1/query?query=channel_revision",
//! )?;
//! let fetch = FetchChannelsUseCase::new(feed, Arc::clone(&store), StderrProgressReporter::new());
//! let report = fetch.execute().await?;
//! println!("{} evaluation(s) scheduled", report.scheduled);
//!
//! // Hand the resulting change events to the cache builder
//! let cache = Arc::new(SuggestionCacheBuilder::new(
//!     Arc::clone(&store),
//!     SuggestionBuilder::new(DEFAULT_MAX_MATCHES, "https://github.com/NixOS/nixpkgs"),
//! ));
//! let notifier = ChangeNotifier::new(Arc::clone(&store), vec![cache as Arc<dyn ChangeConsumer>]);
//! notifier.drain_once().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod ports;
pub mod shared;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::outbound::console::StderrProgressReporter;
    pub use crate::adapters::outbound::evaluator::{NixEvalJobs, NixEvalJobsOptions};
    pub use crate::adapters::outbound::filesystem::CveListDirectory;
    pub use crate::adapters::outbound::git::GitMirror;
    pub use crate::adapters::outbound::network::PrometheusChannelFeed;
    pub use crate::adapters::outbound::persistence::SqliteTrackerStore;
    pub use crate::application::dto::{
        DrainReport, EvaluationRunReport, FetchReport, IngestMode, IngestReport,
        RegenerateReport, WorkOutcome,
    };
    pub use crate::application::use_cases::{
        ChangeNotifier, EvaluationScheduler, FetchChannelsUseCase, IngestCvesUseCase,
        PipelineDaemon, RecomputeStatus, RecoverEvaluationsUseCase, SchedulerConfig,
        SuggestionCacheBuilder, INTERRUPTED_REASON,
    };
    pub use crate::ports::outbound::{
        ChangeConsumer, ChannelFeed, ChannelMetric, CveBatchOutcome, CveDocumentStream, CveFeed,
        Evaluator, ProgressReporter, RawCveDocument, SourceMirror, TrackerStore,
        CVE_DELTA_CHECKPOINT,
    };
    pub use crate::shared::error::TrackerError;
    pub use crate::shared::Result;
    pub use crate::tracking::domain::{
        ChangeEvent, Channel, ChannelName, ChannelObservation, ChannelSnapshot, ChannelStatus,
        CveId, CveRecord, Derivation, Evaluation, EvaluationId, EvaluationOutcome,
        EvaluationState, Maintainer, MatchBasis, PackageSnapshot, RebuildSummary, RecomputeKey,
        Revision, StoredSuggestion, Suggestion,
    };
    pub use crate::tracking::services::{
        compare_versions, parse_cve_record, parse_drv_name, SuggestionBuilder, DEFAULT_MAX_MATCHES,
    };
}
