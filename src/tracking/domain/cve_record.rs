use crate::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for CVE identifiers (security limit)
const MAX_CVE_ID_LENGTH: usize = 32;

/// NewType wrapper for a CVE identifier (`CVE-YYYY-NNNN...`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CveId(String);

impl CveId {
    pub fn new(id: String) -> Result<Self> {
        if id.len() > MAX_CVE_ID_LENGTH {
            anyhow::bail!(
                "CVE identifier is too long ({} bytes). Maximum allowed: {} bytes",
                id.len(),
                MAX_CVE_ID_LENGTH
            );
        }

        let mut parts = id.splitn(3, '-');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some("CVE"), Some(year), Some(seq))
                if year.len() == 4
                    && year.chars().all(|c| c.is_ascii_digit())
                    && seq.len() >= 4
                    && seq.chars().all(|c| c.is_ascii_digit())
        );
        if !valid {
            anyhow::bail!("Invalid CVE identifier '{}'", id);
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CveId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CveId> for String {
    fn from(value: CveId) -> Self {
        value.0
    }
}

impl fmt::Display for CveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CVSS base score in the range 0.0..=10.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct CvssScore(f32);

impl CvssScore {
    pub fn new(value: f32) -> Result<Self> {
        if !(0.0..=10.0).contains(&value) {
            anyhow::bail!("CVSS score must be between 0.0 and 10.0, got {}", value);
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for CvssScore {
    type Error = anyhow::Error;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CvssScore> for f32 {
    fn from(value: CvssScore) -> Self {
        value.0
    }
}

/// Qualitative severity rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// CVSS v3 qualitative rating scale
    pub fn from_cvss_score(score: CvssScore) -> Self {
        match score.value() {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::None,
        }
    }

    /// Maps free-form `baseSeverity` strings onto the enum
    ///
    /// - "CRITICAL" -> Critical, "HIGH" -> High
    /// - "MODERATE" or "MEDIUM" -> Medium, "LOW" -> Low
    /// - anything else -> None
    pub fn parse_lenient(severity: &str) -> Self {
        match severity.to_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MODERATE" | "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Affectedness of a concrete version with respect to a CVE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Affected,
    Unaffected,
    Unknown,
}

impl VersionStatus {
    pub fn parse_lenient(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "affected" => VersionStatus::Affected,
            "unaffected" => VersionStatus::Unaffected,
            _ => VersionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Affected => "affected",
            VersionStatus::Unaffected => "unaffected",
            VersionStatus::Unknown => "unknown",
        }
    }
}

/// A CVE JSON 5 version entry: either a single version, or a range starting
/// at `version` bounded by `less_than` / `less_than_or_equal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub status: VersionStatus,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal: Option<String>,
}

/// A product listed as affected by a CVE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub default_status: VersionStatus,
    #[serde(default)]
    pub versions: Vec<VersionConstraint>,
}

/// CVERecord entity, unique per identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    pub id: CveId,
    pub published: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<CvssScore>,
    #[serde(default)]
    pub affected: Vec<AffectedProduct>,
}

impl CveRecord {
    /// Ingestion rule: a stored record is replaced only by a strictly newer one.
    pub fn supersedes(&self, stored_last_modified: Option<DateTime<Utc>>) -> bool {
        match stored_last_modified {
            Some(stored) => self.last_modified > stored,
            None => true,
        }
    }
}
