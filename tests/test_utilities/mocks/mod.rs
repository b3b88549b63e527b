/// Mock implementations for testing
mod instrumented_store;
mod mock_channel_feed;
mod mock_cve_feed;
mod mock_evaluator;
mod mock_progress_reporter;
mod mock_source_mirror;

pub use instrumented_store::InstrumentedStore;
pub use mock_channel_feed::MockChannelFeed;
pub use mock_cve_feed::{cve_document, MockCveFeed};
pub use mock_evaluator::MockEvaluator;
pub use mock_progress_reporter::MockProgressReporter;
pub use mock_source_mirror::MockSourceMirror;
