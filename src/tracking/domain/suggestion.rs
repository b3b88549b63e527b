use super::channel::{ChannelName, Revision};
use super::cve_record::{CveId, Severity, VersionStatus};
use super::evaluation::EvaluationId;
use super::package_snapshot::{Maintainer, PackageSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a package was matched against a CVE (bit flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MatchBasis(u8);

impl MatchBasis {
    pub const PACKAGE_NAME_MATCH: MatchBasis = MatchBasis(0b01);
    pub const PRODUCT_MATCH: MatchBasis = MatchBasis(0b10);

    pub fn empty() -> Self {
        MatchBasis(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        MatchBasis(bits & 0b11)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: MatchBasis) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MatchBasis) {
        self.0 |= other.0;
    }
}

impl fmt::Display for MatchBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(MatchBasis::PACKAGE_NAME_MATCH) {
            parts.push("package_name");
        }
        if self.contains(MatchBasis::PRODUCT_MATCH) {
            parts.push("product");
        }
        write!(f, "{}", parts.join("+"))
    }
}

/// Denormalized display payload served to the UI
///
/// Field order and collection ordering are fixed so that serializing the
/// same payload always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionPayload {
    pub cve_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub channel: String,
    pub revision: String,
    pub attribute: String,
    pub derivation_name: String,
    pub version: String,
    pub status: VersionStatus,
    pub systems: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_position: Option<String>,
    pub maintainers: Vec<Maintainer>,
}

/// A cached CVE-to-package suggestion, keyed by (CVE, channel, package).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub cve_id: CveId,
    pub channel: ChannelName,
    /// Package attribute path
    pub package: String,
    pub match_basis: MatchBasis,
    pub status: VersionStatus,
    pub payload: SuggestionPayload,
}

impl Suggestion {
    pub fn key(&self) -> (&CveId, &ChannelName, &str) {
        (&self.cve_id, &self.channel, self.package.as_str())
    }
}

/// A suggestion row as persisted, with its write timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSuggestion {
    pub suggestion: Suggestion,
    pub computed_at: DateTime<Utc>,
}

/// Invalidation key for single-flighted cache recomputation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecomputeKey {
    /// All suggestions of one CVE across every channel
    Cve(CveId),
    /// All suggestions of one channel across every CVE
    Channel(ChannelName),
}

impl fmt::Display for RecomputeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecomputeKey::Cve(id) => write!(f, "cve:{}", id),
            RecomputeKey::Channel(name) => write!(f, "channel:{}", name),
        }
    }
}

/// The latest COMPLETED evaluation of a channel together with its snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub channel: ChannelName,
    pub evaluation_id: EvaluationId,
    pub revision: Revision,
    pub snapshot: PackageSnapshot,
}

/// Summary of one cache rebuild for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildSummary {
    pub removed: usize,
    pub inserted: usize,
}
