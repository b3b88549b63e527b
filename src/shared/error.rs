use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application.
///
/// These codes allow the external scheduler (systemd timers, cron) to
/// distinguish a misconfigured invocation from a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success - the trigger ran to completion
    Success = 0,
    /// Invalid command-line arguments (clap parsing errors)
    InvalidArguments = 2,
    /// Application error (feed unavailable, database error, file I/O error, etc.)
    ApplicationError = 3,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "Success (0)"),
            ExitCode::InvalidArguments => write!(f, "Invalid Arguments (2)"),
            ExitCode::ApplicationError => write!(f, "Application Error (3)"),
        }
    }
}

/// Classified pipeline errors.
///
/// Uses thiserror to derive Display and Error traits automatically.
/// Variants map onto the failure taxonomy of the pipeline: transient I/O,
/// malformed input, evaluator failure and data-integrity violations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Feed unavailable: {feed}\nDetails: {details}\n\n💡 Hint: The next scheduled run will retry; check network access to the feed")]
    FeedUnavailable { feed: String, details: String },

    #[error("Malformed record '{record}': {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("Evaluation of {revision} failed: {details}")]
    EvaluationFailed { revision: String, details: String },

    #[error("Evaluation of {revision} timed out after {seconds}s")]
    EvaluationTimedOut { revision: String, seconds: u64 },

    #[error("Invalid evaluation state transition for evaluation {evaluation_id}: {from} -> {to}")]
    InvalidTransition {
        evaluation_id: i64,
        from: String,
        to: String,
    },

    #[error("Data integrity violation: {details}\n\n💡 Hint: The operation was aborted and no rows were changed")]
    IntegrityViolation { details: String },

    #[error("Failed to make revision {revision} available in {path}\nDetails: {details}\n\n💡 Hint: The evaluation stays pending and is retried on the next scheduling attempt")]
    SourceSyncFailed {
        revision: String,
        path: PathBuf,
        details: String,
    },

    #[error("Invalid configuration: {message}\n\n💡 Hint: {hint}")]
    Config { message: String, hint: String },

    /// Validation error for domain newtypes
    #[error("Validation error: {message}")]
    Validation { message: String },
}
