//! Configuration file support for nix-sectrack.
//!
//! Provides YAML-based configuration through `nix-sectrack.config.yml` files,
//! including data structures, file loading, validation and defaults.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use nix_sectrack::shared::error::TrackerError;
use nix_sectrack::shared::security::validate_command_argument;
use nix_sectrack::shared::Result;

pub const CONFIG_FILENAME: &str = "nix-sectrack.config.yml";

const DEFAULT_DATABASE_PATH: &str = "nix-sectrack.sqlite3";
const DEFAULT_MONITORING_URL: &str =
    "https://prometheus.nixos.org/api/v1/query?query=channel_revision";
const DEFAULT_CLONE_URL: &str = "https://github.com/NixOS/nixpkgs";
const MAX_WORKERS_LIMIT: usize = 64;

/// Top-level configuration file schema.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub database_path: Option<PathBuf>,
    pub monitoring_url: Option<String>,
    pub initial_sync: Option<bool>,
    pub nixpkgs: Option<NixpkgsSection>,
    pub evaluation: Option<EvaluationSection>,
    pub cve: Option<CveSection>,
    pub suggestions: Option<SuggestionsSection>,
    /// Captures unknown fields for warnings.
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NixpkgsSection {
    pub clone_url: Option<String>,
    pub checkout_path: Option<PathBuf>,
    pub worktrees_path: Option<PathBuf>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EvaluationSection {
    pub max_workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub command: Option<String>,
    pub eval_workers: Option<usize>,
    pub gc_roots_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CveSection {
    pub list_path: Option<PathBuf>,
    pub update_before_scan: Option<bool>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SuggestionsSection {
    pub max_matches: Option<usize>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

/// Effective settings after applying defaults to the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub monitoring_url: String,
    pub initial_sync: bool,
    pub clone_url: String,
    pub checkout_path: PathBuf,
    pub worktrees_path: PathBuf,
    pub max_workers: usize,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub evaluator_command: String,
    pub eval_workers: usize,
    pub gc_roots_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cve_list_path: PathBuf,
    pub cve_update_before_scan: bool,
    pub max_matches: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_config(ConfigFile::default())
    }
}

impl Settings {
    /// Applies defaults to every option the file leaves unset.
    pub fn from_config(config: ConfigFile) -> Self {
        let nixpkgs = config.nixpkgs.unwrap_or_default();
        let evaluation = config.evaluation.unwrap_or_default();
        let cve = config.cve.unwrap_or_default();
        let suggestions = config.suggestions.unwrap_or_default();

        Self {
            database_path: config
                .database_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            monitoring_url: config
                .monitoring_url
                .unwrap_or_else(|| DEFAULT_MONITORING_URL.to_string()),
            initial_sync: config.initial_sync.unwrap_or(false),
            clone_url: nixpkgs
                .clone_url
                .unwrap_or_else(|| DEFAULT_CLONE_URL.to_string()),
            checkout_path: nixpkgs
                .checkout_path
                .unwrap_or_else(|| PathBuf::from("nixpkgs")),
            worktrees_path: nixpkgs
                .worktrees_path
                .unwrap_or_else(|| PathBuf::from("nixpkgs-worktrees")),
            max_workers: evaluation.max_workers.unwrap_or(3),
            timeout: Duration::from_secs(evaluation.timeout_secs.unwrap_or(3600)),
            retry_delay: Duration::from_secs(evaluation.retry_delay_secs.unwrap_or(60)),
            evaluator_command: evaluation
                .command
                .unwrap_or_else(|| "nix-eval-jobs".to_string()),
            eval_workers: evaluation.eval_workers.unwrap_or(1),
            gc_roots_dir: evaluation
                .gc_roots_dir
                .unwrap_or_else(|| PathBuf::from("nixpkgs-gc-roots")),
            logs_dir: evaluation
                .logs_dir
                .unwrap_or_else(|| PathBuf::from("nixpkgs-evaluation-logs")),
            cve_list_path: cve.list_path.unwrap_or_else(|| PathBuf::from("cvelistV5")),
            cve_update_before_scan: cve.update_before_scan.unwrap_or(true),
            max_matches: suggestions
                .max_matches
                .unwrap_or(nix_sectrack::tracking::services::DEFAULT_MAX_MATCHES),
        }
    }
}

/// Load config from an explicit path. Returns an error if the file is not found.
pub fn load_config_from_path(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\n💡 Hint: Check that the file exists and is readable.",
            path.display()
        )
    })?;

    let config: ConfigFile = serde_yaml_ng::from_str(&content).with_context(|| {
        format!(
            "Failed to parse config file: {}\n\n💡 Hint: Ensure the file contains valid YAML syntax.",
            path.display()
        )
    })?;

    validate_config(&config)?;
    warn_unknown_fields(&config);

    Ok(config)
}

/// Auto-discover config in a directory. Returns `None` silently if not found.
pub fn discover_config(dir: &Path) -> Result<Option<ConfigFile>> {
    let config_path = dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(None);
    }

    let config = load_config_from_path(&config_path)?;
    Ok(Some(config))
}

/// Resolves the effective settings: the explicit file if given, otherwise
/// the discovered one, otherwise defaults.
pub fn load_settings(explicit: Option<&Path>, dir: &Path) -> Result<Settings> {
    let config = match explicit {
        Some(path) => load_config_from_path(path)?,
        None => discover_config(dir)?.unwrap_or_default(),
    };
    Ok(Settings::from_config(config))
}

fn invalid(message: impl Into<String>, hint: impl Into<String>) -> anyhow::Error {
    TrackerError::Config {
        message: message.into(),
        hint: hint.into(),
    }
    .into()
}

/// Validate the loaded configuration.
fn validate_config(config: &ConfigFile) -> Result<()> {
    if let Some(url) = &config.monitoring_url {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(invalid(
                format!("monitoring_url '{}' is not an http(s) URL", url),
                "Point monitoring_url at the Prometheus query endpoint, e.g. \
                 https://prometheus.nixos.org/api/v1/query?query=channel_revision",
            ));
        }
    }

    if let Some(nixpkgs) = &config.nixpkgs {
        if let Some(url) = &nixpkgs.clone_url {
            validate_command_argument(url, "nixpkgs.clone_url").map_err(|e| {
                invalid(e.to_string(), "Use the repository URL git should clone")
            })?;
        }
    }

    if let Some(evaluation) = &config.evaluation {
        if let Some(workers) = evaluation.max_workers {
            if workers == 0 || workers > MAX_WORKERS_LIMIT {
                return Err(invalid(
                    format!(
                        "evaluation.max_workers must be between 1 and {} (got {})",
                        MAX_WORKERS_LIMIT, workers
                    ),
                    "Each worker runs a full evaluation; 1 to 4 suits most machines",
                ));
            }
        }
        if evaluation.timeout_secs == Some(0) {
            return Err(invalid(
                "evaluation.timeout_secs must be greater than 0",
                "A full nixpkgs evaluation takes tens of minutes; 3600 is a safe start",
            ));
        }
        if evaluation.eval_workers == Some(0) {
            return Err(invalid(
                "evaluation.eval_workers must be greater than 0",
                "This is the --workers value passed to the evaluator",
            ));
        }
        if let Some(command) = &evaluation.command {
            validate_command_argument(command, "evaluation.command").map_err(|e| {
                invalid(e.to_string(), "Name the evaluator program, e.g. nix-eval-jobs")
            })?;
        }
    }

    if let Some(suggestions) = &config.suggestions {
        if suggestions.max_matches == Some(0) {
            return Err(invalid(
                "suggestions.max_matches must be greater than 0",
                "CVEs matching more packages than this are skipped for a channel",
            ));
        }
    }

    Ok(())
}

/// Dotted names of every unknown field, sorted.
fn unknown_field_names(config: &ConfigFile) -> Vec<String> {
    let top = config.unknown_fields.keys().map(|k| k.to_string());
    let nested = [
        ("nixpkgs", config.nixpkgs.as_ref().map(|s| &s.unknown_fields)),
        ("evaluation", config.evaluation.as_ref().map(|s| &s.unknown_fields)),
        ("cve", config.cve.as_ref().map(|s| &s.unknown_fields)),
        ("suggestions", config.suggestions.as_ref().map(|s| &s.unknown_fields)),
    ]
    .into_iter()
    .filter_map(|(section, fields)| fields.map(|f| (section, f)))
    .flat_map(|(section, fields)| fields.keys().map(move |k| format!("{}.{}", section, k)));

    let mut names: Vec<String> = top.chain(nested).collect();
    names.sort();
    names
}

/// Warn about unknown fields in the config file.
fn warn_unknown_fields(config: &ConfigFile) {
    for name in unknown_field_names(config) {
        warn!(field = %name, "Unknown config field will be ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.yml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
database_path: /var/lib/sectrack/db.sqlite3
monitoring_url: http://localhost:9090/api/v1/query?query=channel_revision
initial_sync: true
nixpkgs:
  clone_url: https://example.org/nixpkgs.git
  checkout_path: /srv/nixpkgs
evaluation:
  max_workers: 2
  timeout_secs: 120
  logs_dir: /var/log/sectrack
cve:
  list_path: /srv/cvelistV5
  update_before_scan: false
suggestions:
  max_matches: 50
"#,
        );

        let settings = Settings::from_config(load_config_from_path(&path).unwrap());
        assert_eq!(settings.database_path, PathBuf::from("/var/lib/sectrack/db.sqlite3"));
        assert!(settings.initial_sync);
        assert_eq!(settings.clone_url, "https://example.org/nixpkgs.git");
        assert_eq!(settings.checkout_path, PathBuf::from("/srv/nixpkgs"));
        assert_eq!(settings.worktrees_path, PathBuf::from("nixpkgs-worktrees"));
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.logs_dir, PathBuf::from("/var/log/sectrack"));
        assert!(!settings.cve_update_before_scan);
        assert_eq!(settings.max_matches, 50);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(settings.monitoring_url, DEFAULT_MONITORING_URL);
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.timeout, Duration::from_secs(3600));
        assert_eq!(settings.retry_delay, Duration::from_secs(60));
        assert_eq!(settings.evaluator_command, "nix-eval-jobs");
        assert!(settings.cve_update_before_scan);
        assert!(!settings.initial_sync);
    }

    #[test]
    fn test_discover_config_found() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "initial_sync: true\n").unwrap();

        let config = discover_config(dir.path()).unwrap();
        assert_eq!(config.unwrap().initial_sync, Some(true));
    }

    #[test]
    fn test_discover_config_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
        assert_eq!(load_settings(None, dir.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config_from_path(Path::new("/nonexistent/config.yml"));
        let err = format!("{}", result.unwrap_err());
        assert!(err.contains("Failed to read config file"));
    }

    #[test]
    fn test_load_config_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "invalid: yaml: [[[broken");

        let err = format!("{}", load_config_from_path(&path).unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_worker_limit_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "evaluation:\n  max_workers: 0\n");

        let err = format!("{}", load_config_from_path(&path).unwrap_err());
        assert!(err.contains("evaluation.max_workers must be between 1 and 64"));
        assert!(err.contains("💡 Hint"));
    }

    #[test]
    fn test_zero_timeout_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "evaluation:\n  timeout_secs: 0\n");

        let err = format!("{}", load_config_from_path(&path).unwrap_err());
        assert!(err.contains("timeout_secs must be greater than 0"));
    }

    #[test]
    fn test_monitoring_url_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "monitoring_url: ftp://example.org\n");

        let err = format!("{}", load_config_from_path(&path).unwrap_err());
        assert!(err.contains("is not an http(s) URL"));
    }

    #[test]
    fn test_option_like_command_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "evaluation:\n  command: --help\n");

        assert!(load_config_from_path(&path).is_err());
    }

    #[test]
    fn test_unknown_fields_collected_with_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
unknown_field: true
evaluation:
  max_workers: 1
  parallelism: 8
"#,
        );

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(
            unknown_field_names(&config),
            vec!["evaluation.parallelism".to_string(), "unknown_field".to_string()]
        );
    }
}
