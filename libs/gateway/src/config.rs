//! Gateway Configuration
//!
//! A plain configuration struct assembled once at startup and handed to
//! [`Gateway::open`](crate::Gateway::open). It can be built in code, parsed
//! from a URL-shaped address, or loaded from a TOML file with `GATEWAY__*`
//! environment overrides.

use crate::{GatewayError, Result};
use anyhow::Context;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default port of a container's TCP API
pub const DEFAULT_PORT: u16 = 1100;
/// Delay between reconnection attempts (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
/// Base timeout for gateway-level calls (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;
/// Default timeout for request/receive (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1_000;
/// Default timeout for parameter get/set (milliseconds)
pub const DEFAULT_PARAM_TIMEOUT_MS: u64 = 5_000;
/// Max number of unconsumed inbound messages kept
pub const DEFAULT_QUEUE_SIZE: usize = 128;
/// Directory calls wait this many base timeouts for an answer
pub const DIRECTORY_TIMEOUT_MULTIPLIER: u32 = 8;

/// Byte-stream flavour used to reach the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Line-delimited JSON over a TCP stream
    #[default]
    Tcp,
    /// JSON text frames over a WebSocket
    Ws,
    /// JSON text frames over a TLS WebSocket
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    /// Parse a URL scheme
    pub fn parse(scheme: &str) -> Result<Self> {
        match scheme {
            "tcp" => Ok(Scheme::Tcp),
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(GatewayError::configuration(
                format!("Unsupported scheme '{}'", other),
                Some("scheme"),
            )),
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a container endpoint; at most one gateway exists per address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayAddress {
    pub hostname: String,
    pub port: u16,
    pub path: String,
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.hostname, self.port, self.path)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub scheme: Scheme,
    pub hostname: String,
    pub port: u16,
    pub path: String,
    /// Reconnect after the link drops
    pub keep_alive: bool,
    pub reconnect_delay_ms: u64,
    /// Base timeout for gateway-level calls; directory calls wait 8x this
    pub timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub param_timeout_ms: u64,
    pub queue_size: usize,
    /// Failed directory/parameter calls yield empty results instead of errors
    pub return_null_on_failure: bool,
    /// Tell the container which ids and topics this gateway wants messages for
    pub announce_subscriptions: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Tcp,
            hostname: "localhost".to_string(),
            port: DEFAULT_PORT,
            path: String::new(),
            keep_alive: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            param_timeout_ms: DEFAULT_PARAM_TIMEOUT_MS,
            queue_size: DEFAULT_QUEUE_SIZE,
            return_null_on_failure: true,
            announce_subscriptions: false,
        }
    }
}

impl GatewayConfig {
    /// Configuration for a TCP container at `hostname:port`
    pub fn tcp(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Default::default()
        }
    }

    /// Configuration for a WebSocket container at `ws://hostname:port/path`
    pub fn websocket(hostname: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Ws,
            hostname: hostname.into(),
            port,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse a URL-shaped address (`tcp://host:port`, `ws://host:port/path`)
    pub fn from_url(address: &str) -> Result<Self> {
        let url = Url::parse(address)?;
        let scheme = Scheme::parse(url.scheme())?;
        let hostname = url
            .host_str()
            .ok_or_else(|| GatewayError::configuration("URL has no host", Some("hostname")))?
            .to_string();
        let port = match scheme {
            Scheme::Tcp => url.port().unwrap_or(DEFAULT_PORT),
            Scheme::Ws | Scheme::Wss => url.port_or_known_default().unwrap_or(DEFAULT_PORT),
        };
        let path = match url.path() {
            "" | "/" if scheme == Scheme::Tcp => String::new(),
            p => p.to_string(),
        };
        Ok(Self {
            scheme,
            hostname,
            port,
            path,
            ..Default::default()
        })
    }

    /// Load from a TOML file, with `GATEWAY__<FIELD>` environment overrides
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        debug!(path = %path.display(), "Loading gateway configuration");

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build gateway configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize gateway configuration")?;
        config.validate().context("Invalid gateway configuration")?;
        Ok(config)
    }

    /// Reject settings the gateway cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(GatewayError::configuration("hostname is empty", Some("hostname")));
        }
        if self.port == 0 {
            return Err(GatewayError::configuration("port must be non-zero", Some("port")));
        }
        if self.queue_size == 0 {
            return Err(GatewayError::configuration(
                "queue_size must be at least 1",
                Some("queue_size"),
            ));
        }
        Ok(())
    }

    /// Identity triple used by the gateway registry
    pub fn address(&self) -> GatewayAddress {
        GatewayAddress {
            hostname: self.hostname.clone(),
            port: self.port,
            path: self.normalized_path(),
        }
    }

    /// Connector URL
    pub fn url(&self) -> Result<Url> {
        let url = format!(
            "{}://{}:{}{}",
            self.scheme,
            self.hostname,
            self.port,
            self.normalized_path()
        );
        Ok(Url::parse(&url)?)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms) * DIRECTORY_TIMEOUT_MULTIPLIER
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn param_timeout(&self) -> Duration {
        Duration::from_millis(self.param_timeout_ms)
    }

    fn normalized_path(&self) -> String {
        if self.path.is_empty() || self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.scheme, Scheme::Tcp);
        assert_eq!(config.port, 1100);
        assert!(config.keep_alive);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(5000));
        assert_eq!(config.request_timeout(), Duration::from_millis(1000));
        assert_eq!(config.queue_size, 128);
        assert!(config.return_null_on_failure);
        assert_eq!(config.directory_timeout(), Duration::from_millis(8000));
    }

    #[test]
    fn test_from_tcp_url() {
        let config = GatewayConfig::from_url("tcp://10.0.0.7:1101").unwrap();
        assert_eq!(config.scheme, Scheme::Tcp);
        assert_eq!(config.hostname, "10.0.0.7");
        assert_eq!(config.port, 1101);
        assert_eq!(config.path, "");
        assert_eq!(config.url().unwrap().as_str(), "tcp://10.0.0.7:1101");
    }

    #[test]
    fn test_from_ws_url() {
        let config = GatewayConfig::from_url("ws://modem.local:8081/ws/").unwrap();
        assert_eq!(config.scheme, Scheme::Ws);
        assert_eq!(config.port, 8081);
        assert_eq!(config.path, "/ws/");
        assert_eq!(
            config.address(),
            GatewayAddress {
                hostname: "modem.local".to_string(),
                port: 8081,
                path: "/ws/".to_string(),
            }
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = GatewayConfig::from_url("http://localhost:80/").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_path_is_normalized() {
        let config = GatewayConfig::websocket("localhost", 8080, "ws");
        assert_eq!(config.address().path, "/ws");
        assert_eq!(config.url().unwrap().as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn test_validate() {
        let mut config = GatewayConfig::tcp("localhost", 1100);
        assert!(config.validate().is_ok());
        config.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "hostname = \"192.168.0.42\"\nport = 1102\nqueue_size = 16\nreturn_null_on_failure = false"
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.hostname, "192.168.0.42");
        assert_eq!(config.port, 1102);
        assert_eq!(config.queue_size, 16);
        assert!(!config.return_null_on_failure);
        assert!(config.keep_alive);
    }
}
