//! Client configuration with construction-time validation
//!
//! A single explicit configuration structure replaces ad-hoc option maps:
//! every field is named and typed, and `validate` rejects values the
//! executors cannot honor before any request is issued.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained admission rate; also the bucket capacity
    pub requests_per_second: f64,
    /// Trailing window for throughput reporting, in seconds
    pub window_size: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            window_size: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_second: f64, window_size: u64) -> Self {
        Self {
            requests_per_second,
            window_size,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(Error::Configuration {
                message: "requests_per_second must be positive".to_string(),
            });
        }
        if self.window_size == 0 {
            return Err(Error::Configuration {
                message: "window_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries in the memory tier
    pub max_size: usize,
    /// Default time-to-live in seconds
    pub default_ttl: u64,
    /// Whether to persist entries to the durable tier
    pub durable_enabled: bool,
    /// Directory for durable artifacts; required when durable_enabled
    pub durable_directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: 3600,
            durable_enabled: false,
            durable_directory: None,
        }
    }
}

impl CacheConfig {
    /// Enable the durable tier under the given directory
    pub fn with_durable_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.durable_enabled = true;
        self.durable_directory = Some(directory.into());
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl = seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Configuration {
                message: "cache max_size must be positive".to_string(),
            });
        }
        if self.default_ttl == 0 {
            return Err(Error::Configuration {
                message: "cache default_ttl must be positive".to_string(),
            });
        }
        if self.durable_enabled && self.durable_directory.is_none() {
            return Err(Error::Configuration {
                message: "durable cache requires durable_directory".to_string(),
            });
        }
        Ok(())
    }
}

/// How the identity rotator walks its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationMode {
    /// Deterministic round-robin, exhaustive across the pool
    Sequential,
    /// Uniform random selection
    Random,
}

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retry attempts after the first, so a request makes at most
    /// max_retries + 1 transport calls
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff between attempts
    pub retry_delay: f64,
    /// Whether to verify TLS certificates
    pub verify_tls: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    /// Assign a rotated identity header to requests that lack one
    pub identity_rotation: bool,
    pub identity_mode: RotationMode,
    /// Alternate egress endpoints (proxies) to rotate across attempts
    pub egress_endpoints: Vec<String>,
    /// Connection pool cap per destination host
    pub max_connections_per_host: usize,
    /// Upper bound on simultaneous in-flight requests in batch execution
    pub max_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: 1.0,
            verify_tls: true,
            follow_redirects: true,
            max_redirects: 5,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            identity_rotation: true,
            identity_mode: RotationMode::Sequential,
            egress_endpoints: Vec::new(),
            max_connections_per_host: 10,
            max_connections: 100,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay = seconds;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_identity_rotation(mut self, enabled: bool) -> Self {
        self.identity_rotation = enabled;
        self
    }

    pub fn with_identity_mode(mut self, mode: RotationMode) -> Self {
        self.identity_mode = mode;
        self
    }

    pub fn with_egress_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.egress_endpoints = endpoints;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Configuration {
                message: "timeout must be positive".to_string(),
            });
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(Error::Configuration {
                message: "retry_delay must be non-negative".to_string(),
            });
        }
        if self.max_connections_per_host == 0 || self.max_connections == 0 {
            return Err(Error::Configuration {
                message: "connection pool caps must be positive".to_string(),
            });
        }
        self.rate_limit.validate()?;
        self.cache.validate()?;
        for endpoint in &self.egress_endpoints {
            Url::parse(endpoint).map_err(|e| Error::Configuration {
                message: format!("invalid egress endpoint {}: {}", endpoint, e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, 1.0);
        assert!(config.verify_tls);
        assert!(config.follow_redirects);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.rate_limit.requests_per_second, 10.0);
        assert_eq!(config.cache.max_size, 1000);
        assert!(config.identity_rotation);
        assert!(config.egress_endpoints.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_validation() {
        assert!(RateLimitConfig::new(0.0, 60).validate().is_err());
        assert!(RateLimitConfig::new(-1.0, 60).validate().is_err());
        assert!(RateLimitConfig::new(f64::NAN, 60).validate().is_err());
        assert!(RateLimitConfig::new(5.0, 0).validate().is_err());
        assert!(RateLimitConfig::new(5.0, 60).validate().is_ok());
    }

    #[test]
    fn test_cache_validation() {
        let config = CacheConfig::default().with_max_size(0);
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.durable_enabled = true;
        assert!(config.validate().is_err());

        let config = CacheConfig::default().with_durable_directory("/tmp/cache");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ClientConfig::default().with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_retry_delay_rejected() {
        let config = ClientConfig::default().with_retry_delay(-1.0);
        assert!(config.validate().is_err());
        // zero is allowed: it disables the backoff wait, not the retries
        let config = ClientConfig::default().with_retry_delay(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_egress_endpoint_rejected() {
        let config =
            ClientConfig::default().with_egress_endpoints(vec!["not a url".to_string()]);
        assert!(config.validate().is_err());

        let config = ClientConfig::default()
            .with_egress_endpoints(vec!["http://proxy.local:8080".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ClientConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
