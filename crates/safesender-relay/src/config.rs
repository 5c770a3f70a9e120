//! Relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Relay core configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Envelope time-to-live in seconds
    pub message_ttl_secs: u64,
    /// Sweeper interval in seconds
    pub sweep_interval_secs: u64,
    /// Maximum payload size in bytes
    pub max_payload_bytes: usize,
    /// Maximum public key size in bytes
    pub max_public_key_bytes: usize,
    /// Ceiling on payload bytes held at once
    pub max_store_bytes: u64,
    /// Reject envelopes for recipients without a registered key
    pub require_registered_recipient: bool,
    /// Rate limiting
    pub rate_limit: RateLimitConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_ttl_secs: crate::DEFAULT_MESSAGE_TTL_SECS,
            sweep_interval_secs: crate::DEFAULT_SWEEP_INTERVAL_SECS,
            max_payload_bytes: crate::MAX_PAYLOAD_SIZE,
            max_public_key_bytes: crate::MAX_PUBLIC_KEY_SIZE,
            max_store_bytes: crate::DEFAULT_MAX_STORE_BYTES,
            require_registered_recipient: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Get message TTL as Duration
    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Message lifetime in whole minutes, as reported by the status endpoint
    pub fn message_lifetime_minutes(&self) -> u64 {
        self.message_ttl_secs / 60
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.message_ttl_secs == 0 {
            return Err(RelayError::Config("message_ttl_secs must be > 0".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RelayError::Config("sweep_interval_secs must be > 0".to_string()));
        }
        if self.max_payload_bytes == 0 {
            return Err(RelayError::Config("max_payload_bytes must be > 0".to_string()));
        }
        if self.max_public_key_bytes == 0 {
            return Err(RelayError::Config("max_public_key_bytes must be > 0".to_string()));
        }
        if self.max_store_bytes < self.max_payload_bytes as u64 {
            return Err(RelayError::Config(
                "max_store_bytes must hold at least one maximum-size payload".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rate limiting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum seconds between accepted sends from one key; 0 disables throttling
    pub min_send_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_send_interval_secs: crate::DEFAULT_MIN_SEND_INTERVAL_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Get minimum send interval as Duration
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_secs(self.min_send_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.message_lifetime_minutes(), 10);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(!config.require_registered_recipient);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = RelayConfig {
            message_ttl_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_store_smaller_than_payload_rejected() {
        let config = RelayConfig {
            max_payload_bytes: 1024,
            max_store_bytes: 512,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            message_ttl_secs = 120

            [rate_limit]
            min_send_interval_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.message_ttl_secs, 120);
        assert_eq!(config.rate_limit.min_send_interval_secs, 2);
        assert_eq!(config.max_payload_bytes, crate::MAX_PAYLOAD_SIZE);
    }
}
