//! Client configuration
//!
//! A [`Config`] is built once and handed to [`crate::Client::new`]; the client
//! never mutates it afterwards. Values come from code (defaults plus the
//! `with_*` builders), from a YAML file, or from the `marathon` CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Marathon endpoint
pub const DEFAULT_URL: &str = "http://127.0.0.1:8080";

/// Default port for the event callback listener
pub const DEFAULT_EVENTS_PORT: u16 = 10001;

/// Default interface the callback listener binds to
pub const DEFAULT_EVENTS_INTERFACE: &str = "eth0";

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default delay between recovery probes of a down member, in milliseconds
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 2000;

/// Default config file location: ~/.marathon/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marathon")
        .join("config.yaml")
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// How Marathon events reach this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventsTransport {
    /// Marathon POSTs events to a listener hosted by this client
    #[default]
    Callback,
    /// The client holds open the `/v2/events` server-sent-event stream
    Stream,
}

/// Settings for a [`crate::Client`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Marathon URL; several hosts may be given comma separated,
    /// e.g. `http://10.0.0.1:8080,10.0.0.2:8080`
    pub url: String,

    /// Timeout applied to every API request
    pub request_timeout_secs: u64,

    /// Event delivery mechanism
    pub events_transport: EventsTransport,

    /// Interface whose address the callback listener binds to
    pub events_interface: String,

    /// Port of the callback listener
    pub events_port: u16,

    /// Callback URL registered with Marathon instead of the computed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,

    /// HTTP basic auth user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth_user: Option<String>,

    /// HTTP basic auth password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth_password: Option<String>,

    /// Delay between recovery probes of an unavailable member
    pub probe_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            events_transport: EventsTransport::default(),
            events_interface: DEFAULT_EVENTS_INTERFACE.to_string(),
            events_port: DEFAULT_EVENTS_PORT,
            callback_url: None,
            basic_auth_user: None,
            basic_auth_password: None,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Create a config for the given Marathon URL with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout in seconds
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Select the events transport
    pub fn with_events_transport(mut self, transport: EventsTransport) -> Self {
        self.events_transport = transport;
        self
    }

    /// Set the interface and port of the callback listener
    pub fn with_events_listener(mut self, interface: impl Into<String>, port: u16) -> Self {
        self.events_interface = interface.into();
        self.events_port = port;
        self
    }

    /// Register this URL with Marathon instead of the computed callback URL
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Use HTTP basic auth on every request
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth_user = Some(user.into());
        self.basic_auth_password = Some(password.into());
        self
    }

    /// Set the delay between recovery probes
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Parse a config from YAML
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load config from the default location
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&default_config_path())
}

/// Load config from a specific path, falling back to defaults when the file
/// does not exist
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
