use crate::ports::outbound::{ChannelFeed, ChannelMetric};
use crate::shared::error::TrackerError;
use crate::shared::security::MAX_FEED_RESPONSE_SIZE;
use crate::shared::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    metric: RawMetric,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetric {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    variant: Option<String>,
}

/// PrometheusChannelFeed adapter for the channel monitoring endpoint
///
/// Queries the `channel_revision` metric of the NixOS Prometheus instance
/// and returns its label sets as channel metrics.
pub struct PrometheusChannelFeed {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl PrometheusChannelFeed {
    const TIMEOUT_SECONDS: u64 = 30;

    pub fn new(url: impl Into<String>) -> Result<Self> {
        let version = env!("CARGO_PKG_VERSION");
        let user_agent = format!("nix-sectrack/{}", version);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::TIMEOUT_SECONDS))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            max_retries: 3,
        })
    }

    async fn fetch_with_retry(&self) -> Result<Vec<ChannelMetric>> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.fetch_once().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt, error = %e, "channel feed request failed");
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(TrackerError::FeedUnavailable {
            feed: self.url.clone(),
            details: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        }
        .into())
    }

    async fn fetch_once(&self) -> Result<Vec<ChannelMetric>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Monitoring endpoint returned status code {}", response.status());
        }

        if let Some(length) = response.content_length() {
            if length > MAX_FEED_RESPONSE_SIZE as u64 {
                anyhow::bail!(
                    "Security: Monitoring response is too large ({} bytes). Maximum allowed: {} bytes",
                    length,
                    MAX_FEED_RESPONSE_SIZE
                );
            }
        }

        let body = response.bytes().await?;
        parse_query_response(&body)
    }
}

/// Parses a Prometheus instant-query response into channel metrics
fn parse_query_response(body: &[u8]) -> Result<Vec<ChannelMetric>> {
    if body.len() > MAX_FEED_RESPONSE_SIZE {
        anyhow::bail!(
            "Security: Monitoring response is too large ({} bytes). Maximum allowed: {} bytes",
            body.len(),
            MAX_FEED_RESPONSE_SIZE
        );
    }

    let response: QueryResponse = serde_json::from_slice(body)?;
    if response.status != "success" {
        anyhow::bail!(
            "Monitoring query did not succeed (status '{}'): {}",
            response.status,
            response.error.unwrap_or_default()
        );
    }

    Ok(response
        .data
        .map(|data| data.result)
        .unwrap_or_default()
        .into_iter()
        .map(|r| ChannelMetric {
            channel: r.metric.channel,
            revision: r.metric.revision,
            status: r.metric.status,
            variant: r.metric.variant,
        })
        .collect())
}

#[async_trait]
impl ChannelFeed for PrometheusChannelFeed {
    async fn fetch_channel_metrics(&self) -> Result<Vec<ChannelMetric>> {
        self.fetch_with_retry().await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
