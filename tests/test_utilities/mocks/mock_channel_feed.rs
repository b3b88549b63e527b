use async_trait::async_trait;
use nix_sectrack::prelude::*;
use std::sync::Mutex;

/// Mock ChannelFeed serving a replaceable list of metric tuples
#[derive(Default)]
pub struct MockChannelFeed {
    metrics: Mutex<Vec<ChannelMetric>>,
    unavailable: Mutex<bool>,
}

impl MockChannelFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(self, channel: &str, revision: &str, status: &str) -> Self {
        self.push(channel, revision, status);
        self
    }

    pub fn push(&self, channel: &str, revision: &str, status: &str) {
        self.metrics.lock().unwrap().push(ChannelMetric {
            channel: Some(channel.to_string()),
            revision: Some(revision.to_string()),
            status: Some(status.to_string()),
            variant: None,
        });
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl ChannelFeed for MockChannelFeed {
    async fn fetch_channel_metrics(&self) -> Result<Vec<ChannelMetric>> {
        if *self.unavailable.lock().unwrap() {
            return Err(TrackerError::FeedUnavailable {
                feed: self.describe(),
                details: "connection refused".to_string(),
            }
            .into());
        }
        Ok(self.metrics.lock().unwrap().clone())
    }

    fn describe(&self) -> String {
        "mock monitoring feed".to_string()
    }
}
