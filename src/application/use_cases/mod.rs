/// Use cases module containing the pipeline's orchestration logic
mod change_notifier;
mod evaluation_scheduler;
mod fetch_channels;
mod ingest_cves;
mod pipeline_daemon;
mod recover_evaluations;
mod store_task;
mod suggestion_cache_builder;

pub use change_notifier::{ChangeNotifier, DEFAULT_BATCH_SIZE};
pub use evaluation_scheduler::{EvaluationScheduler, SchedulerConfig};
pub use fetch_channels::FetchChannelsUseCase;
pub use ingest_cves::IngestCvesUseCase;
pub use pipeline_daemon::PipelineDaemon;
pub use recover_evaluations::{RecoverEvaluationsUseCase, INTERRUPTED_REASON};
pub use suggestion_cache_builder::{
    RecomputeStatus, SuggestionCacheBuilder, CHANNEL_REBUILD_THRESHOLD,
};
