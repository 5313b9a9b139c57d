//! Delivery of ready exchanges to downstream consumers.
//!
//! # Module Structure
//!
//! - `retry` - Bounded exponential backoff policy
//! - `sink` - `ExchangeSink` trait with channel, webhook and log sinks
//! - `emitter` - Background delivery with retry, then persistence

mod emitter;
mod retry;
mod sink;

pub use emitter::Emitter;
pub use retry::RetryPolicy;
pub use sink::{ChannelSink, DeliveryError, ExchangeSink, LogSink, WebhookSink};

use crate::config::{DeliveryConfig, SinkConfig};
use std::sync::Arc;
use std::time::Duration;

/// Build the configured sink. The channel sink is also returned concretely
/// so the caller can attach a consumer to it.
pub fn create_sink(
    config: &DeliveryConfig,
) -> anyhow::Result<(Arc<dyn ExchangeSink>, Option<Arc<ChannelSink>>)> {
    match &config.sink {
        SinkConfig::Channel { capacity } => {
            let sink = Arc::new(ChannelSink::new(*capacity));
            Ok((sink.clone(), Some(sink)))
        }
        SinkConfig::Webhook { url, timeout_ms } => {
            let sink = WebhookSink::new(url, Duration::from_millis(*timeout_ms))?;
            tracing::info!("Delivering exchanges to webhook {}", url);
            Ok((Arc::new(sink), None))
        }
        SinkConfig::Log => Ok((Arc::new(LogSink), None)),
    }
}
