use crate::error::ExporterError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variables parsed into typed values (numbers, enums).
pub const TYPED_ENV_KEYS: &[&str] = &[
    "PORT",
    "LOG_FORMAT",
    "OPENCTI_TIMEOUT_SECS",
    "SCRAPE_TIMEOUT_SECS",
];

/// Environment variables taken verbatim as strings, so `METRICS_SUBSYSTEM=42`
/// or an all-digit token keep their exact text.
pub const STRING_ENV_KEYS: &[&str] = &[
    "LISTEN_ADDRESS",
    "LOG_LEVEL",
    "OPENCTI_URL",
    "OPENCTI_TOKEN",
    "METRICS_SUBSYSTEM",
    "METRICS_PATH",
];

/// Upper bound for both timeouts.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Top-level exporter configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Port to run the HTTP server on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Full bind address; wins over `port` when set.
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_opencti_url")]
    pub opencti_url: String,
    #[serde(default)]
    pub opencti_token: Option<String>,
    /// Per-request timeout of the OpenCTI HTTP client.
    #[serde(default = "default_opencti_timeout")]
    pub opencti_timeout_secs: u64,

    /// Prometheus subsystem inserted between `opencti` and the metric name.
    #[serde(default)]
    pub metrics_subsystem: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    /// Upper bound for one whole collection.
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_port() -> u16 { 10031 }
fn default_log_level() -> String { "info".into() }
fn default_opencti_url() -> String { "http://opencti:8080".into() }
fn default_opencti_timeout() -> u64 { 10 }
fn default_metrics_path() -> String { "/metrics".into() }
fn default_scrape_timeout() -> u64 { 30 }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            listen_address: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            opencti_url: default_opencti_url(),
            opencti_token: None,
            opencti_timeout_secs: default_opencti_timeout(),
            metrics_subsystem: String::new(),
            metrics_path: default_metrics_path(),
            scrape_timeout_secs: default_scrape_timeout(),
        }
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("port", &self.port)
            .field("listen_address", &self.listen_address)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("opencti_url", &self.opencti_url)
            .field("opencti_token", &self.opencti_token.as_ref().map(|_| "<redacted>"))
            .field("opencti_timeout_secs", &self.opencti_timeout_secs)
            .field("metrics_subsystem", &self.metrics_subsystem)
            .field("metrics_path", &self.metrics_path)
            .field("scrape_timeout_secs", &self.scrape_timeout_secs)
            .finish()
    }
}

impl ExporterConfig {
    /// Defaults, then the YAML file (if any), then environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ExporterConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::raw().only(TYPED_ENV_KEYS));
        for key in STRING_ENV_KEYS {
            if let Ok(value) = std::env::var(key) {
                figment = figment.merge(Serialized::default(&key.to_ascii_lowercase(), value));
            }
        }
        figment
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ExporterError> {
        let config: ExporterConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExporterError> {
        match self.opencti_token.as_deref() {
            None | Some("") => {
                return Err(ExporterError::ConfigError(
                    "OPENCTI_TOKEN is required".into(),
                ));
            }
            Some(_) => {}
        }
        if self.opencti_url.trim().is_empty() {
            return Err(ExporterError::ConfigError("OPENCTI_URL must not be empty".into()));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ExporterError::ConfigError(format!(
                "METRICS_PATH must start with '/', got {:?}",
                self.metrics_path
            )));
        }
        for (name, secs) in [
            ("OPENCTI_TIMEOUT_SECS", self.opencti_timeout_secs),
            ("SCRAPE_TIMEOUT_SECS", self.scrape_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(ExporterError::ConfigError(format!(
                    "{name} must be between 1 and {MAX_TIMEOUT_SECS}, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        match &self.listen_address {
            Some(addr) => addr.clone(),
            None => format!("0.0.0.0:{}", self.port),
        }
    }

    /// The token, empty when missing. Only meaningful after `validate`.
    pub fn token(&self) -> &str {
        self.opencti_token.as_deref().unwrap_or_default()
    }

    pub fn opencti_timeout(&self) -> Duration {
        Duration::from_secs(self.opencti_timeout_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }
}
