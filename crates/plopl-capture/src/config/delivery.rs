//! Delivery retry and sink configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub sink: SinkConfig,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            sink: SinkConfig::default(),
        }
    }
}

/// Where ready exchanges are delivered.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// In-process channel a consumer attaches to.
    Channel {
        #[serde(default = "default_channel_capacity")]
        capacity: usize,
    },
    /// HTTP POST of each event as JSON.
    Webhook {
        #[serde(default)]
        url: String,
        #[serde(default = "default_webhook_timeout_ms")]
        timeout_ms: u64,
    },
    /// Log each event; never fails.
    Log,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Channel {
            capacity: default_channel_capacity(),
        }
    }
}
