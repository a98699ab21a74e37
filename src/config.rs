//! Runtime configuration.
//!
//! Built programmatically or parsed from TOML:
//!
//! ```toml
//! debug = false
//!
//! [http]
//! bind_addr = "0.0.0.0:3000"
//! cross_origin = true
//! shutdown_grace = "30s"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Debug mode: the recovery middleware lets panics through untouched.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// Add permissive CORS headers to every response.
    pub cross_origin: bool,
    /// How long a graceful shutdown waits for in-flight connections.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_owned(),
            cross_origin: false,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Compact,
    Json,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        text.parse()
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_cross_origin(mut self, enabled: bool) -> Self {
        self.http.cross_origin = enabled;
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.http.bind_addr = addr.into();
        self
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(!config.debug);
        assert_eq!(config.http.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.http.shutdown_grace, Duration::from_secs(30));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::from_toml(
            r#"
            debug = true

            [http]
            bind_addr = "127.0.0.1:8080"
            cross_origin = true
            shutdown_grace = "5s"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert!(config.debug);
        assert!(config.http.cross_origin);
        assert_eq!(config.http.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.http.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("[http]\nport = 80\n").unwrap_err();
        assert!(err.is_configuration());
    }
}
