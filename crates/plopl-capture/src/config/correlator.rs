//! Correlator timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelatorConfig {
    /// How long a matched request waits for its response before a
    /// placeholder is synthesized.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Lifetime of signals buffered for a correlation key nobody announced.
    #[serde(default = "default_response_buffer_ttl_ms")]
    pub response_buffer_ttl_ms: u64,
    /// How long a placeholder exchange stays live waiting for the real
    /// response.
    #[serde(default = "default_late_response_window_ms")]
    pub late_response_window_ms: u64,
}

fn default_wait_timeout_ms() -> u64 {
    2000
}

fn default_response_buffer_ttl_ms() -> u64 {
    2000
}

fn default_late_response_window_ms() -> u64 {
    30_000
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            response_buffer_ttl_ms: default_response_buffer_ttl_ms(),
            late_response_window_ms: default_late_response_window_ms(),
        }
    }
}

impl CorrelatorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn response_buffer_ttl(&self) -> Duration {
        Duration::from_millis(self.response_buffer_ttl_ms)
    }

    pub fn late_response_window(&self) -> Duration {
        Duration::from_millis(self.late_response_window_ms)
    }
}
