use super::channel::{ChannelName, Revision};
use super::cve_record::CveId;
use super::evaluation::EvaluationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// "Something changed" notification written to the outbox in the same
/// transaction as the mutation it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A (channel, revision) pair was observed that differs from the stored revision
    NewRevision {
        channel: ChannelName,
        revision: Revision,
    },
    /// A CVE record was created or replaced by a newer version
    CveChanged { cve_id: CveId },
    /// An evaluation reached COMPLETED
    EvaluationCompleted {
        evaluation_id: EvaluationId,
        channel: ChannelName,
    },
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::NewRevision { channel, revision } => {
                write!(f, "new-revision {}@{}", channel, revision)
            }
            ChangeEvent::CveChanged { cve_id } => write!(f, "cve-changed {}", cve_id),
            ChangeEvent::EvaluationCompleted {
                evaluation_id,
                channel,
            } => write!(f, "evaluation-completed {} ({})", evaluation_id, channel),
        }
    }
}

/// An outbox entry awaiting delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    /// Outbox sequence number; delivery follows this order
    pub sequence: i64,
    pub event: ChangeEvent,
}
