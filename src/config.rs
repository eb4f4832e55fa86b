//! Operator configuration, read from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(Error::config(format!(
                "Invalid LOG_FORMAT '{}': must be one of: json, text",
                other
            ))),
        }
    }
}

/// Operator settings
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Port for the metrics and health endpoints
    pub metrics_port: u16,
    /// Restrict watches to one namespace
    pub watch_namespace: Option<String>,
    /// Requeue delay after a retryable failure
    pub error_requeue: Duration,
    /// Requeue delay after a failure that needs manual intervention
    pub config_error_requeue: Duration,
    pub log_format: LogFormat,
    /// Server-side apply field manager on the remote cluster
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: 8080,
            watch_namespace: None,
            error_requeue: Duration::from_secs(30),
            config_error_requeue: Duration::from_secs(300),
            log_format: LogFormat::Json,
            field_manager: "auto-import-controller".to_string(),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid {} '{}': {}", name, raw, e))),
    }
}

impl OperatorConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            metrics_port: parse_var(&lookup, "METRICS_PORT", defaults.metrics_port)?,
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            error_requeue: Duration::from_secs(parse_var(
                &lookup,
                "ERROR_REQUEUE_SECS",
                defaults.error_requeue.as_secs(),
            )?),
            config_error_requeue: Duration::from_secs(parse_var(
                &lookup,
                "CONFIG_ERROR_REQUEUE_SECS",
                defaults.config_error_requeue.as_secs(),
            )?),
            log_format,
            field_manager: lookup("FIELD_MANAGER")
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.field_manager),
        })
    }
}
