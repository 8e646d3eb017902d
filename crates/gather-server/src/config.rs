//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the gather server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between server-initiated Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// How long to wait for a Pong before disconnecting, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Default cache entry TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Interval between cache sweeps in seconds.
    pub cache_sweep_interval_secs: u64,
    /// HS256 secret for verifying handshake tokens.
    pub jwt_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            cache_ttl_secs: 300,
            cache_sweep_interval_secs: 320,
            jwt_secret: "insecure-dev-secret".into(),
        }
    }
}

impl ServerConfig {
    /// Defaults with `GATHER_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides.
    ///
    /// Integers must parse and fall within range; invalid values are
    /// silently ignored (keeping the current value).
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("GATHER_HOST") {
            self.host = v;
        }
        if let Some(v) = read_env_u64("GATHER_PORT", 0, u64::from(u16::MAX)) {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.port = v as u16;
            }
        }
        if let Some(v) = read_env_u64("GATHER_HEARTBEAT_INTERVAL_SECS", 1, 600) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = read_env_u64("GATHER_HEARTBEAT_TIMEOUT_SECS", 1, 3600) {
            self.heartbeat_timeout_secs = v;
        }
        if let Some(v) = read_env_u64("GATHER_CACHE_TTL_SECS", 1, 86_400) {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = read_env_u64("GATHER_CACHE_SWEEP_INTERVAL_SECS", 1, 86_400) {
            self.cache_sweep_interval_secs = v;
        }
        if let Some(v) = read_env_string("GATHER_JWT_SECRET") {
            self.jwt_secret = v;
        }
    }

    /// Heartbeat ping interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat pong timeout.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Default cache TTL.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Cache sweep interval.
    #[must_use]
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(parse_string)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u64(&v, min, max))
}

fn parse_string(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn parse_u64(value: &str, min: u64, max: u64) -> Option<u64> {
    value.parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}
