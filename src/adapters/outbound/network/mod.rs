/// Network adapters for external API calls
mod prometheus_channel_feed;

pub use prometheus_channel_feed::PrometheusChannelFeed;
