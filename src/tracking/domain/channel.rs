use crate::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for channel names (security limit)
const MAX_CHANNEL_NAME_LENGTH: usize = 255;

/// Maximum length for revisions (a SHA-256 git object id is 64 hex digits)
const MAX_REVISION_LENGTH: usize = 64;

/// NewType wrapper for a channel name with validation
///
/// Names come from an external monitoring feed and end up in git worktree
/// paths and log lines, so only a conservative character set is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: String) -> Result<Self> {
        if name.is_empty() {
            anyhow::bail!("Channel name cannot be empty");
        }

        if name.len() > MAX_CHANNEL_NAME_LENGTH {
            anyhow::bail!(
                "Channel name is too long ({} bytes). Maximum allowed: {} bytes",
                name.len(),
                MAX_CHANNEL_NAME_LENGTH
            );
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            anyhow::bail!(
                "Channel name '{}' contains invalid characters. Only ASCII alphanumeric, hyphens, underscores and dots are allowed.",
                name
            );
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ChannelName> for String {
    fn from(value: ChannelName) -> Self {
        value.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// NewType wrapper for an opaque source revision (a git commit id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    pub fn new(revision: String) -> Result<Self> {
        if revision.is_empty() {
            anyhow::bail!("Revision cannot be empty");
        }

        if revision.len() > MAX_REVISION_LENGTH {
            anyhow::bail!(
                "Revision is too long ({} bytes). Maximum allowed: {} bytes",
                revision.len(),
                MAX_REVISION_LENGTH
            );
        }

        // Security: revisions are handed to git as positional arguments
        if !revision.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!(
                "Revision '{}' contains invalid characters. Only ASCII alphanumeric characters are allowed.",
                revision
            );
        }

        Ok(Self(revision))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Revision {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Support status of a channel as reported by the monitoring feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Rolling,
    /// Also covers `beta`, a release branch that has not been released yet
    Stable,
    /// Still maintained but about to reach end of life
    Deprecated,
    Unmaintained,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Rolling => "rolling",
            ChannelStatus::Stable => "stable",
            ChannelStatus::Deprecated => "deprecated",
            ChannelStatus::Unmaintained => "unmaintained",
        }
    }

    /// End-of-life channels are still recorded but no longer evaluated.
    pub fn is_evaluated(&self) -> bool {
        !matches!(self, ChannelStatus::Unmaintained)
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rolling" => Ok(ChannelStatus::Rolling),
            "stable" | "beta" => Ok(ChannelStatus::Stable),
            "deprecated" => Ok(ChannelStatus::Deprecated),
            "unmaintained" => Ok(ChannelStatus::Unmaintained),
            other => anyhow::bail!("Unknown channel status '{}'", other),
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One validated `{channel, revision, status, variant?}` tuple from the
/// monitoring feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelObservation {
    pub name: ChannelName,
    pub revision: Revision,
    pub status: ChannelStatus,
    pub variant: Option<String>,
}

impl ChannelObservation {
    pub fn new(
        name: String,
        revision: String,
        status: &str,
        variant: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: ChannelName::new(name)?,
            revision: Revision::new(revision)?,
            status: status.parse()?,
            variant: variant.filter(|v| !v.trim().is_empty()),
        })
    }
}

/// Channel entity: one row per name, updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: ChannelName,
    pub status: ChannelStatus,
    pub variant: Option<String>,
    pub revision: Revision,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of recording a channel observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelUpdate {
    /// The channel did not exist before.
    pub created: bool,
    /// The channel is new or its stored revision differs from the observed one.
    pub revision_changed: bool,
    /// A new-revision event was emitted for the observation.
    pub scheduled: bool,
}
