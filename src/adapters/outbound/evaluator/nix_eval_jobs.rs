use crate::ports::outbound::Evaluator;
use crate::shared::error::TrackerError;
use crate::shared::Result;
use crate::tracking::domain::{Derivation, Maintainer, PackageSnapshot, Revision};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Entry point evaluated inside the checkout
const RELEASE_EXPRESSION: &str = "pkgs/top-level/release.nix";

/// How many trailing stderr lines are kept in a failure message
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobLine {
    #[serde(default)]
    attr: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    drv_path: Option<String>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    meta: Option<JobMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct JobMeta {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    maintainers: Vec<JobMaintainer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobMaintainer {
    #[serde(default)]
    github: Option<String>,
    #[serde(default)]
    github_id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
}

/// Options for invoking `nix-eval-jobs`
#[derive(Debug, Clone)]
pub struct NixEvalJobsOptions {
    /// Program to run
    pub command: String,
    /// Value of `--workers`
    pub workers: usize,
    pub gc_roots_dir: PathBuf,
    /// Directory receiving the evaluator's stderr, one file per revision
    pub logs_dir: Option<PathBuf>,
}

/// NixEvalJobs adapter running `nix-eval-jobs` against a checkout
///
/// The child process is killed when the evaluation future is dropped, so a
/// timed-out evaluation never keeps consuming the machine.
pub struct NixEvalJobs {
    options: NixEvalJobsOptions,
}

impl NixEvalJobs {
    pub fn new(options: NixEvalJobsOptions) -> Self {
        Self { options }
    }

    fn failed(revision: &Revision, details: impl Into<String>) -> anyhow::Error {
        TrackerError::EvaluationFailed {
            revision: revision.to_string(),
            details: details.into(),
        }
        .into()
    }

    async fn write_log(&self, revision: &Revision, stderr: &str) {
        let Some(dir) = &self.options.logs_dir else {
            return;
        };
        let path = dir.join(format!("{}.log", revision));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, stderr).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to write evaluation log");
        }
    }
}

/// Parses one line of `nix-eval-jobs` output
///
/// # Returns
/// `None` for lines reporting an attribute that failed to evaluate
fn parse_job_line(line: &str, checkout: &Path) -> Result<Option<Derivation>> {
    let job: JobLine = serde_json::from_str(line)?;

    if let Some(error) = job.error {
        tracing::debug!(attr = job.attr.as_deref().unwrap_or("?"), error = %error.lines().next().unwrap_or(""), "attribute failed to evaluate");
        return Ok(None);
    }

    let (Some(attr), Some(name), Some(drv_path), Some(system)) =
        (job.attr, job.name, job.drv_path, job.system)
    else {
        anyhow::bail!("job line is missing attr, name, drvPath or system");
    };

    let attribute = attr
        .strip_suffix(&format!(".{}", system))
        .map(str::to_string)
        .unwrap_or(attr);
    let meta = job.meta.unwrap_or_default();

    Ok(Some(Derivation {
        attribute,
        name,
        system,
        drv_path,
        description: meta.description.filter(|d| !d.trim().is_empty()),
        position: meta.position.map(|p| relative_position(&p, checkout)),
        maintainers: meta
            .maintainers
            .into_iter()
            .map(|m| Maintainer {
                github: m.github,
                github_id: m.github_id,
                name: m.name,
            })
            .collect(),
    }))
}

/// Positions are reported as absolute paths inside the checkout (or a store
/// copy of it); the repository-relative part is kept.
fn relative_position(position: &str, checkout: &Path) -> String {
    let checkout = checkout.to_string_lossy();
    if let Some(rest) = position.strip_prefix(checkout.as_ref()) {
        return rest.trim_start_matches('/').to_string();
    }
    if position.starts_with("/nix/store/") {
        if let Some((_, rest)) = position.split_once("-source/") {
            return rest.to_string();
        }
    }
    position.to_string()
}

async fn read_jobs<R>(stdout: R, checkout: &Path) -> Result<Vec<Derivation>>
where
    R: AsyncRead + Unpin,
{
    let mut derivations = Vec::new();
    let mut skipped = 0usize;
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_job_line(&line, checkout) {
            Ok(Some(derivation)) => derivations.push(derivation),
            Ok(None) => skipped += 1,
            Err(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "unparseable evaluator output line");
            }
        }
    }
    if skipped > 0 {
        tracing::info!(skipped, evaluated = derivations.len(), "some attributes did not evaluate");
    }
    Ok(derivations)
}

async fn read_all<R>(mut stream: R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl Evaluator for NixEvalJobs {
    async fn evaluate(&self, checkout: &Path, revision: &Revision) -> Result<PackageSnapshot> {
        tokio::fs::create_dir_all(&self.options.gc_roots_dir).await?;
        let expression = checkout.join(RELEASE_EXPRESSION);

        let mut child = Command::new(&self.options.command)
            .arg("--meta")
            .arg("--force-recurse")
            .arg("--workers")
            .arg(self.options.workers.to_string())
            .arg("--gc-roots-dir")
            .arg(&self.options.gc_roots_dir)
            .arg(&expression)
            .current_dir(checkout)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Self::failed(
                    revision,
                    format!("failed to start {}: {}", self.options.command, e),
                )
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(Self::failed(revision, "evaluator pipes are unavailable"));
        };

        tracing::info!(revision = %revision, pid = ?child.id(), "evaluator started");
        let (derivations, stderr) = tokio::try_join!(read_jobs(stdout, checkout), read_all(stderr))?;
        let status = child.wait().await?;
        self.write_log(revision, &stderr).await;

        if !status.success() {
            return Err(Self::failed(
                revision,
                format!("evaluator exited with {}\n{}", status, tail(&stderr, STDERR_TAIL_LINES)),
            ));
        }

        tracing::info!(revision = %revision, derivations = derivations.len(), "evaluator finished");
        Ok(PackageSnapshot::new(derivations))
    }
}
