//! Configuration types for the capture pipeline.

mod correlator;
mod delivery;
mod store;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use correlator::CorrelatorConfig;
pub use delivery::{DeliveryConfig, SinkConfig};
pub use store::{RedisConfig, StoreConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let correlator = &self.correlator;
        if correlator.wait_timeout_ms == 0
            || correlator.response_buffer_ttl_ms == 0
            || correlator.late_response_window_ms == 0
        {
            anyhow::bail!(
                "Correlator timeouts must be greater than zero \
                 (wait_timeout_ms, response_buffer_ttl_ms, late_response_window_ms)"
            );
        }

        let delivery = &self.delivery;
        if delivery.max_attempts == 0 {
            anyhow::bail!("delivery.max_attempts must be at least 1");
        }
        if delivery.backoff_factor.is_nan() || delivery.backoff_factor < 1.0 {
            anyhow::bail!(
                "delivery.backoff_factor must be >= 1.0, got {}",
                delivery.backoff_factor
            );
        }
        if delivery.max_delay_ms < delivery.base_delay_ms {
            anyhow::bail!(
                "delivery.max_delay_ms ({}) is below delivery.base_delay_ms ({})",
                delivery.max_delay_ms,
                delivery.base_delay_ms
            );
        }
        match &delivery.sink {
            SinkConfig::Webhook { url, .. } if url.trim().is_empty() => {
                anyhow::bail!("Webhook sink requires 'delivery.sink.url'");
            }
            SinkConfig::Channel { capacity: 0 } => {
                anyhow::bail!("Channel sink capacity must be at least 1");
            }
            _ => {}
        }

        match self.store.backend.as_str() {
            "inmemory" => {}
            "file" if self.store.path.is_none() => {
                anyhow::bail!("File store backend requires 'store.path'");
            }
            "file" => {}
            "redis" if self.store.redis.is_none() => {
                anyhow::bail!("Redis store backend requires a 'store.redis' section");
            }
            "redis" => {}
            other => anyhow::bail!("Unknown store backend: '{other}'"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.correlator.wait_timeout_ms, 2000);
        assert_eq!(config.correlator.response_buffer_ttl_ms, 2000);
        assert_eq!(config.correlator.late_response_window_ms, 30_000);
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.base_delay_ms, 500);
        assert_eq!(config.delivery.backoff_factor, 1.5);
        assert_eq!(config.delivery.sink, SinkConfig::Channel { capacity: 64 });
        assert_eq!(config.store.backend, "inmemory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
correlator:
  wait_timeout_ms: 1500
delivery:
  max_attempts: 5
  sink:
    type: webhook
    url: http://localhost:9000/exchanges
store:
  backend: file
  path: /tmp/captures.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.correlator.wait_timeout_ms, 1500);
        assert_eq!(config.correlator.late_response_window_ms, 30_000);
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(
            config.delivery.sink,
            SinkConfig::Webhook {
                url: "http://localhost:9000/exchanges".to_string(),
                timeout_ms: 5000
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_redis_store() {
        let yaml = r#"
store:
  backend: redis
  redis:
    url: redis://localhost:6379
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let redis = config.store.redis.as_ref().unwrap();
        assert_eq!(redis.pool_size, 4);
        assert_eq!(redis.key_prefix, "plopl:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            "correlator: { wait_timeout_ms: 0 }",
            "correlator: { late_response_window_ms: 0 }",
            "delivery: { max_attempts: 0 }",
            "delivery: { backoff_factor: 0.5 }",
            "delivery: { base_delay_ms: 5000, max_delay_ms: 100 }",
            "delivery: { sink: { type: webhook } }",
            "delivery: { sink: { type: channel, capacity: 0 } }",
            "store: { backend: file }",
            "store: { backend: redis }",
            "store: { backend: sqlite }",
        ];
        for yaml in cases {
            let config: Config = serde_yaml::from_str(yaml).unwrap();
            assert!(config.validate().is_err(), "expected '{yaml}' to be rejected");
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delivery:\n  sink:\n    type: log").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.delivery.sink, SinkConfig::Log);
    }

    #[test]
    fn test_from_file_runs_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store:\n  backend: file").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
