use cep_rpc_client::CommunicatorConfig;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_HOST: &str = "SHOTGUN_ADOBE_HOST";
pub const ENV_PORT: &str = "SHOTGUN_ADOBE_PORT";
pub const ENV_HEARTBEAT_TIMEOUT: &str = "SHOTGUN_ADOBE_HEARTBEAT_TIMEOUT";
pub const ENV_RESPONSE_TIMEOUT: &str = "SHOTGUN_ADOBE_RESPONSE_TIMEOUT";
pub const ENV_HEARTBEAT_TOLERANCE: &str = "SHOTGUN_ADOBE_HEARTBEAT_TOLERANCE";
pub const ENV_HEARTBEAT_INTERVAL: &str = "SHOTGUN_ADOBE_HEARTBEAT_INTERVAL";
pub const ENV_NETWORK_DEBUG: &str = "SHOTGUN_ADOBE_NETWORK_DEBUG";
pub const ENV_LOG_DIR: &str = "SHOTGUN_ADOBE_LOG_DIR";
pub const ENV_LOG_FILTER: &str = "SHOTGUN_ADOBE_LOG_FILTER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SHOTGUN_ADOBE_PORT is not set")]
    MissingPort,
    #[error("Unable to resolve {host}:{port}: {reason}")]
    Unresolvable {
        host: String,
        port: u16,
        reason: String,
    },
}

/// Bridge settings, normally read from the environment the panel launched
/// us with.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: Option<u16>,
    /// How long a heartbeat ping may take before it counts as failed.
    pub heartbeat_timeout: Duration,
    /// How long an RPC call or explicit wait may block.
    pub response_timeout: Duration,
    /// Consecutive heartbeat failures tolerated before disconnecting.
    pub heartbeat_tolerance: u32,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub network_debug: bool,
    pub log_dir: Option<PathBuf>,
    /// `EnvFilter` directives. Falls back to `RUST_LOG` when unset.
    pub log_filter: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            heartbeat_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_secs(300),
            heartbeat_tolerance: 2,
            heartbeat_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            network_debug: false,
            log_dir: None,
            log_filter: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Values that do not
    /// parse keep their default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            host: read(ENV_HOST).unwrap_or(defaults.host),
            port: read(ENV_PORT).and_then(|raw| parse_or_warn(ENV_PORT, &raw)),
            heartbeat_timeout: read(ENV_HEARTBEAT_TIMEOUT)
                .and_then(|raw| parse_seconds(ENV_HEARTBEAT_TIMEOUT, &raw))
                .unwrap_or(defaults.heartbeat_timeout),
            response_timeout: read(ENV_RESPONSE_TIMEOUT)
                .and_then(|raw| parse_seconds(ENV_RESPONSE_TIMEOUT, &raw))
                .unwrap_or(defaults.response_timeout),
            heartbeat_tolerance: read(ENV_HEARTBEAT_TOLERANCE)
                .and_then(|raw| parse_or_warn(ENV_HEARTBEAT_TOLERANCE, &raw))
                .unwrap_or(defaults.heartbeat_tolerance),
            heartbeat_interval: read(ENV_HEARTBEAT_INTERVAL)
                .and_then(|raw| parse_seconds(ENV_HEARTBEAT_INTERVAL, &raw))
                .unwrap_or(defaults.heartbeat_interval),
            poll_interval: defaults.poll_interval,
            network_debug: read(ENV_NETWORK_DEBUG)
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.network_debug),
            log_dir: read(ENV_LOG_DIR).map(PathBuf::from),
            log_filter: read(ENV_LOG_FILTER).or_else(|| read("RUST_LOG")),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        self.port.ok_or(ConfigError::MissingPort)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self.port()?;
        let unresolvable = |reason: String| ConfigError::Unresolvable {
            host: self.host.clone(),
            port,
            reason,
        };
        (self.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| unresolvable(e.to_string()))?
            .next()
            .ok_or_else(|| unresolvable("no addresses".to_string()))
    }

    pub fn communicator_config(&self) -> CommunicatorConfig {
        CommunicatorConfig {
            poll_interval: self.poll_interval,
            response_timeout: self.response_timeout,
            network_debug: self.network_debug,
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring unparsable setting");
            None
        }
    }
}

fn parse_seconds(key: &str, raw: &str) -> Option<Duration> {
    let seconds: f64 = parse_or_warn(key, raw)?;
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => Some(duration),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring out of range duration");
            None
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
