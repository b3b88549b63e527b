mod cli;
mod config;

use anyhow::Context;
use cli::{Args, Command};
use config::Settings;
use nix_sectrack::adapters::outbound::console::StderrProgressReporter;
use nix_sectrack::adapters::outbound::evaluator::{NixEvalJobs, NixEvalJobsOptions};
use nix_sectrack::adapters::outbound::filesystem::CveListDirectory;
use nix_sectrack::adapters::outbound::git::GitMirror;
use nix_sectrack::adapters::outbound::network::PrometheusChannelFeed;
use nix_sectrack::adapters::outbound::persistence::SqliteTrackerStore;
use nix_sectrack::application::dto::{DrainReport, FetchReport, IngestReport, RegenerateReport};
use nix_sectrack::application::use_cases::{
    ChangeNotifier, EvaluationScheduler, FetchChannelsUseCase, IngestCvesUseCase,
    PipelineDaemon, RecoverEvaluationsUseCase, SchedulerConfig, SuggestionCacheBuilder,
};
use nix_sectrack::ports::outbound::ChangeConsumer;
use nix_sectrack::shared::error::ExitCode;
use nix_sectrack::shared::Result;
use nix_sectrack::tracking::services::SuggestionBuilder;
use owo_colors::OwoColorize;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

type Scheduler = EvaluationScheduler<SqliteTrackerStore, GitMirror, NixEvalJobs>;
type CacheBuilder = SuggestionCacheBuilder<SqliteTrackerStore>;
type CveIngestor = IngestCvesUseCase<CveListDirectory, SqliteTrackerStore, StderrProgressReporter>;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    if let Err(e) = init_logging(&args) {
        eprintln!("\n❌ Failed to initialize logging: {:#}\n", e);
        process::exit(ExitCode::ApplicationError.as_i32());
    }

    if let Err(e) = run(args).await {
        eprintln!("\n❌ An error occurred:\n");
        eprintln!("{}", e);

        // Display error chain
        for cause in e.chain().skip(1) {
            eprintln!("\nCaused by: {}", cause);
        }

        eprintln!();
        process::exit(ExitCode::ApplicationError.as_i32());
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("failed to open log file {}", log_file.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let working_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let settings = config::load_settings(args.config.as_deref(), &working_dir)?;
    let pipeline = Pipeline::build(settings)?;

    match args.command {
        Command::FetchChannels => {
            let report = pipeline.fetch_channels().await?;
            let drained = pipeline.notifier().drain_once().await?;
            print_fetch_summary(&report, &drained);
            if report.has_failures() {
                anyhow::bail!(
                    "{} channel observation(s) could not be recorded",
                    report.failed
                );
            }
        }
        Command::IngestCveDelta => {
            let report = pipeline.cve_ingestor().ingest_delta().await?;
            let drained = pipeline.notifier().drain_once().await?;
            print_ingest_summary(&report, &drained);
        }
        Command::IngestCveBulk { limit } => {
            let limit = limit
                .map(usize::try_from)
                .transpose()
                .context("--limit does not fit this platform")?;
            let report = pipeline.cve_ingestor().ingest_bulk(limit).await?;
            let drained = pipeline.notifier().drain_once().await?;
            print_ingest_summary(&report, &drained);
        }
        Command::RegenerateSuggestions => {
            let report = pipeline
                .cache_builder
                .regenerate_all(&StderrProgressReporter::new())
                .await?;
            print_regenerate_summary(&report);
            if !report.failures.is_empty() {
                anyhow::bail!(
                    "{} suggestion rebuild(s) failed",
                    report.failures.len()
                );
            }
        }
        Command::CleanUpCrashedEvaluations => {
            let recovered = RecoverEvaluationsUseCase::new(Arc::clone(&pipeline.store)).execute()?;
            eprintln!(
                "{} {} interrupted evaluation(s) marked as failed",
                "✅".green(),
                recovered.len()
            );
        }
        Command::Run => pipeline.serve().await?,
    }

    Ok(())
}

/// The adapters and long-lived components shared by every subcommand
struct Pipeline {
    settings: Settings,
    store: Arc<SqliteTrackerStore>,
    scheduler: Arc<Scheduler>,
    cache_builder: Arc<CacheBuilder>,
}

impl Pipeline {
    fn build(settings: Settings) -> Result<Self> {
        create_parent_dir(&settings.database_path)?;
        let store = Arc::new(SqliteTrackerStore::open(&settings.database_path)?);

        let mirror = Arc::new(GitMirror::new(
            settings.clone_url.clone(),
            settings.checkout_path.clone(),
            settings.worktrees_path.clone(),
        ));
        let evaluator = Arc::new(NixEvalJobs::new(NixEvalJobsOptions {
            command: settings.evaluator_command.clone(),
            workers: settings.eval_workers,
            gc_roots_dir: settings.gc_roots_dir.clone(),
            logs_dir: Some(settings.logs_dir.clone()),
        }));
        let scheduler = Arc::new(EvaluationScheduler::new(
            Arc::clone(&store),
            mirror,
            evaluator,
            SchedulerConfig {
                max_workers: settings.max_workers,
                timeout: settings.timeout,
                retry_delay: settings.retry_delay,
            },
        ));
        let cache_builder = Arc::new(SuggestionCacheBuilder::new(
            Arc::clone(&store),
            SuggestionBuilder::new(settings.max_matches, &settings.clone_url),
        ));

        Ok(Self {
            settings,
            store,
            scheduler,
            cache_builder,
        })
    }

    /// Notifier delivering to the scheduler first, then to the cache builder
    fn notifier(&self) -> ChangeNotifier<SqliteTrackerStore> {
        let consumers: Vec<Arc<dyn ChangeConsumer>> = vec![
            Arc::clone(&self.scheduler) as Arc<dyn ChangeConsumer>,
            Arc::clone(&self.cache_builder) as Arc<dyn ChangeConsumer>,
        ];
        ChangeNotifier::new(Arc::clone(&self.store), consumers)
    }

    async fn fetch_channels(&self) -> Result<FetchReport> {
        let feed = PrometheusChannelFeed::new(self.settings.monitoring_url.clone())?;
        FetchChannelsUseCase::new(feed, Arc::clone(&self.store), StderrProgressReporter::new())
            .execute()
            .await
    }

    fn cve_ingestor(&self) -> CveIngestor {
        let feed = CveListDirectory::new(
            self.settings.cve_list_path.clone(),
            self.settings.cve_update_before_scan,
        );
        IngestCvesUseCase::new(feed, Arc::clone(&self.store), StderrProgressReporter::new())
    }

    /// Long-running mode: recovers crashed evaluations, optionally syncs,
    /// then runs the notifier and the worker pool until Ctrl-C
    async fn serve(&self) -> Result<()> {
        // Step 1: Fail evaluations orphaned by a previous process
        let recovered = RecoverEvaluationsUseCase::new(Arc::clone(&self.store)).execute()?;
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Recovered interrupted evaluations");
        }

        // Step 2: Optional initial sync
        if self.settings.initial_sync {
            self.initial_sync().await;
        }

        // Step 3: Deliver changes and run evaluations until shutdown
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let daemon = PipelineDaemon::new(self.notifier(), Arc::clone(&self.scheduler));
        let shutdown = async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
            }
            info!("Shutdown requested");
            // Receivers may already be gone
            let _ = shutdown_tx.send(true);
        };

        info!(
            database = %self.settings.database_path.display(),
            workers = self.settings.max_workers,
            "nix-sectrack running"
        );
        let (stopped, ()) = tokio::join!(daemon.run(shutdown_rx), shutdown);
        stopped
    }

    /// Failures are logged; the daemon starts regardless
    async fn initial_sync(&self) {
        info!("Running initial sync");
        if let Err(e) = self.fetch_channels().await {
            error!(error = %format!("{:#}", e), "Initial channel fetch failed");
        }
        if let Err(e) = self.cve_ingestor().ingest_delta().await {
            error!(error = %format!("{:#}", e), "Initial CVE ingestion failed");
        }
        match self
            .cache_builder
            .regenerate_all(&StderrProgressReporter::new())
            .await
        {
            Ok(report) => print_regenerate_summary(&report),
            Err(e) => error!(error = %format!("{:#}", e), "Initial suggestion rebuild failed"),
        }
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}

fn print_fetch_summary(report: &FetchReport, drained: &DrainReport) {
    eprintln!("\n{}", "📊 Channel fetch summary".bold());
    eprintln!("   Tuples observed:     {}", report.observed);
    eprintln!("   Channels created:    {}", report.created);
    eprintln!("   Revisions changed:   {}", report.revision_changed);
    eprintln!("   Evaluations queued:  {}", report.scheduled);
    if report.skipped > 0 {
        eprintln!("   Skipped tuples:      {}", report.skipped.yellow());
    }
    if report.failed > 0 {
        eprintln!("   Failed tuples:       {}", report.failed.red());
    }
    eprintln!("   Events delivered:    {}", drained.delivered);
}

fn print_ingest_summary(report: &IngestReport, drained: &DrainReport) {
    eprintln!(
        "\n{}",
        format!("📊 CVE ingestion summary ({})", report.mode).bold()
    );
    eprintln!("   Documents fetched:   {}", report.fetched);
    eprintln!("   New records:         {}", report.inserted.green());
    eprintln!("   Updated records:     {}", report.updated.green());
    eprintln!("   Unchanged records:   {}", report.skipped);
    if report.malformed > 0 {
        eprintln!("   Malformed documents: {}", report.malformed.yellow());
    }
    match report.checkpoint {
        Some(checkpoint) => eprintln!("   Checkpoint:          {}", checkpoint),
        None => eprintln!("   Checkpoint:          unchanged"),
    }
    eprintln!("   Events delivered:    {}", drained.delivered);
}

fn print_regenerate_summary(report: &RegenerateReport) {
    eprintln!("\n{}", "📊 Suggestion cache summary".bold());
    eprintln!("   Keys rebuilt:        {}", report.rebuilt);
    eprintln!("   Suggestions written: {}", report.inserted.green());
    eprintln!("   Stale rows removed:  {}", report.removed);
    if report.coalesced > 0 {
        eprintln!("   Coalesced keys:      {}", report.coalesced);
    }
    for (key, reason) in &report.failures {
        eprintln!("   {} {}: {}", "❌".red(), key, reason);
    }
}
