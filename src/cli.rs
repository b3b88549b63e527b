use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Track CVEs against the packages of Nix channels
#[derive(Parser, Debug)]
#[command(name = "nix-sectrack")]
#[command(version)]
#[command(
    about = "Track CVEs against the packages of Nix channels",
    long_about = "Fetches channel revisions and CVE records, evaluates each new revision with \
                  the Nix evaluator and keeps a cache of CVE-to-package suggestions. Each \
                  subcommand is one trigger meant to be run by an external scheduler; `run` \
                  hosts the evaluation workers and the cache builder."
)]
pub struct Args {
    /// Path to the configuration file (defaults to ./nix-sectrack.config.yml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "nix_sectrack=debug"
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Record the channel revisions published by the monitoring endpoint
    FetchChannels,

    /// Ingest CVE records modified since the last checkpoint
    IngestCveDelta,

    /// Ingest the full CVE corpus
    IngestCveBulk {
        /// Stop after this many records
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        limit: Option<u64>,
    },

    /// Rebuild every cached suggestion
    RegenerateSuggestions,

    /// Mark evaluations left RUNNING by a crashed process as FAILED
    CleanUpCrashedEvaluations,

    /// Run the evaluation workers and the cache builder until interrupted
    Run,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
