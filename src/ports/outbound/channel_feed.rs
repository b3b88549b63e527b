use crate::shared::Result;
use async_trait::async_trait;

/// One raw metric tuple as returned by the monitoring endpoint
///
/// Fields are optional because the feed is external input; validation into
/// a `ChannelObservation` happens in the fetch use case so that a malformed
/// tuple can be skipped without discarding the rest of the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMetric {
    pub channel: Option<String>,
    pub revision: Option<String>,
    pub status: Option<String>,
    pub variant: Option<String>,
}

/// ChannelFeed port for reading channel -> revision mappings
///
/// This port abstracts the external monitoring endpoint (e.g. the
/// Prometheus `channel_revision` metric) so that the fetch use case can be
/// exercised without network access.
#[async_trait]
pub trait ChannelFeed: Send + Sync {
    /// Fetches every channel metric currently published by the feed
    ///
    /// # Returns
    /// The metric tuples in feed order
    ///
    /// # Errors
    /// Returns an error if:
    /// - The endpoint cannot be reached after retries
    /// - The response is not a successful query result
    /// - The response body cannot be parsed
    async fn fetch_channel_metrics(&self) -> Result<Vec<ChannelMetric>>;

    /// Human-readable description of the feed location, for logs
    fn describe(&self) -> String;
}
