use crate::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// An unparsed CVE record document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCveDocument {
    /// Where the document came from (file path or URL), used in logs
    pub origin: String,
    pub content: String,
}

/// Documents of one fetch, delivered in chunks as they are read
///
/// Every chunk is non-empty and holds at most the requested chunk size.
/// An `Err` item ends the fetch.
pub type CveDocumentStream = BoxStream<'static, Result<Vec<RawCveDocument>>>;

/// CveFeed port for reading structured CVE records
///
/// Records are returned unparsed; the ingest use case parses each one
/// individually so that a malformed record never aborts a batch. Documents
/// arrive in chunks so a full corpus is never held in memory at once.
#[async_trait]
pub trait CveFeed: Send + Sync {
    /// Fetches the full corpus
    ///
    /// # Arguments
    /// * `limit` - Optional cap on the number of documents returned
    /// * `chunk_size` - Maximum number of documents per chunk
    ///
    /// # Errors
    /// Returns an error if the feed cannot be read at all. Individual
    /// unreadable documents are skipped by implementations.
    async fn fetch_all(&self, limit: Option<usize>, chunk_size: usize)
        -> Result<CveDocumentStream>;

    /// Fetches the documents modified at or after `since`
    ///
    /// Implementations may return extra documents; the store skips records
    /// that are not newer than what it holds.
    ///
    /// # Arguments
    /// * `since` - Checkpoint of the last committed batch; `None` means everything
    /// * `chunk_size` - Maximum number of documents per chunk
    ///
    /// # Errors
    /// Returns an error if the feed cannot be read at all.
    async fn fetch_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<CveDocumentStream>;
}
