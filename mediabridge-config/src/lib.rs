//! Configuration management for the media bridge library
//!
//! The library is loaded into a host process rather than launched, so every
//! setting has a default and the environment (optionally seeded from a
//! `.env` file) only overrides them.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Environment variable prefix, e.g. `MEDIABRIDGE_BACKEND=dispatcher`
pub const ENV_PREFIX: &str = "MEDIABRIDGE";

/// Platform backend running the engine's background work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// Three dedicated threads (network, worker, signaling)
    #[default]
    Threads,
    /// One worker thread plus a host-provided dispatcher queue
    Dispatcher,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Threads => write!(f, "threads"),
            BackendKind::Dispatcher => write!(f, "dispatcher"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threads" => Ok(BackendKind::Threads),
            "dispatcher" => Ok(BackendKind::Dispatcher),
            other => Err(config::ConfigError::Message(format!(
                "unknown backend '{}', expected 'threads' or 'dispatcher'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = config::ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Library configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub backend: BackendKind,
    /// Comma separated shutdown option names, or `none`
    pub shutdown_options: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Prefix of the background thread names
    pub thread_name_prefix: String,
    /// Bound on the dispatcher handshake performed during initialization
    pub dispatcher_setup_timeout_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Threads,
            shutdown_options: Some("log_live_objects".to_string()),
            log_level: Some("info".to_string()),
            json_logs: false,
            thread_name_prefix: "mediabridge".to_string(),
            dispatcher_setup_timeout_ms: 10_000,
        }
    }
}

impl LibraryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load configuration from an arbitrary source layered over the defaults
    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("backend", defaults.backend.to_string())?
            .set_default("shutdown_options", defaults.shutdown_options)?
            .set_default("log_level", defaults.log_level)?
            .set_default("json_logs", defaults.json_logs)?
            .set_default("thread_name_prefix", defaults.thread_name_prefix)?
            .set_default("dispatcher_setup_timeout_ms", defaults.dispatcher_setup_timeout_ms)?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Shutdown option names, lowercased, with `none` and blanks removed
    pub fn shutdown_option_names(&self) -> Vec<String> {
        self.shutdown_options
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty() && name != "none")
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn test_config_defaults() {
        let config = LibraryConfig::from_source(source(&[])).unwrap();
        assert_eq!(config.backend, BackendKind::Threads);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.thread_name_prefix, "mediabridge");
        assert_eq!(config.dispatcher_setup_timeout_ms, 10_000);
        assert_eq!(config.shutdown_option_names(), vec!["log_live_objects"]);
    }

    #[test]
    fn test_config_overrides() {
        let config = LibraryConfig::from_source(source(&[
            ("MEDIABRIDGE_BACKEND", "Dispatcher"),
            ("MEDIABRIDGE_JSON_LOGS", "true"),
            ("MEDIABRIDGE_SHUTDOWN_OPTIONS", "Log_Live_Objects, fail_on_live_objects"),
            ("MEDIABRIDGE_DISPATCHER_SETUP_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Dispatcher);
        assert!(config.json_logs);
        assert_eq!(config.dispatcher_setup_timeout_ms, 250);
        assert_eq!(
            config.shutdown_option_names(),
            vec!["log_live_objects", "fail_on_live_objects"]
        );
    }

    #[test]
    fn test_none_shutdown_options() {
        let config = LibraryConfig {
            shutdown_options: Some("none".to_string()),
            ..LibraryConfig::default()
        };
        assert!(config.shutdown_option_names().is_empty());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Threads".parse::<BackendKind>().unwrap(), BackendKind::Threads);
        assert!("gpu".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = LibraryConfig::from_source(source(&[("MEDIABRIDGE_BACKEND", "gpu")]));
        assert!(result.unwrap_err().to_string().contains("unknown backend 'gpu'"));
    }
}
