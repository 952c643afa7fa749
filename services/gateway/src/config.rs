use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use sensor_feed::backpressure::{BackpressureConfig, DropPolicy};
use sensor_feed::poller::PollerConfig;

pub const DEFAULT_UPSTREAM_URL: &str = "https://rald-dev.greenbeep.com/api/v1/measurements";

/// Gateway configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upstream measurement provider
    pub upstream_url: String,
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
    /// Fixed delay between poll cycles
    pub poll_interval: Duration,
    /// Per-request timeout for the upstream fetch
    pub fetch_timeout: Duration,
    /// Per-subscriber queue settings
    pub backpressure: BackpressureConfig,
}

impl GatewayConfig {
    /// Load configuration from the process environment (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream_url = lookup("FEED_UPSTREAM_URL")
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "FEED_UPSTREAM_URL",
                value: upstream_url,
            });
        }

        let bind_addr = lookup("FEED_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        let poll_interval_ms = parse_positive(&lookup, "FEED_POLL_INTERVAL_MS", 500)?;
        let fetch_timeout_secs = parse_positive(&lookup, "FEED_FETCH_TIMEOUT_SECS", 10)?;
        let queue_capacity = parse_positive(&lookup, "FEED_SUBSCRIBER_BUFFER", 256)? as usize;

        let drop_policy = match lookup("FEED_DROP_POLICY").as_deref() {
            None | Some("drop_oldest") => DropPolicy::DropOldest,
            Some("disconnect") => DropPolicy::Disconnect,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "FEED_DROP_POLICY",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            upstream_url,
            bind_addr,
            poll_interval: Duration::from_millis(poll_interval_ms),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            backpressure: BackpressureConfig {
                queue_capacity,
                drop_policy,
            },
        })
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: self.poll_interval,
        }
    }
}

/// Parse a non-zero integer, falling back to `default` when unset.
fn parse_positive<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
