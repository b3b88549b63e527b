/// Data Transfer Objects for application layer
///
/// Each trigger returns a run report that the CLI turns into a summary.
mod drain_report;
mod evaluation_report;
mod fetch_report;
mod ingest_report;
mod regenerate_report;

pub use drain_report::DrainReport;
pub use evaluation_report::{EvaluationRunReport, WorkOutcome};
pub use fetch_report::FetchReport;
pub use ingest_report::{IngestMode, IngestReport};
pub use regenerate_report::RegenerateReport;
