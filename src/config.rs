//! Instrumentation configuration loaded from environment variables.
//!
//! # Process Identity
//!
//! - `APP_NAME` / `APP_VERSION`: application labels (default: crate name/version)
//! - `REALM`, `REGION`, `AZ`, `DOMAIN`: deployment labels (default: `*`)
//!
//! # Cursor Behaviour
//!
//! - `CURSOR_LABEL_SCHEMA`: `v1` (no parent label) or `v2` (default)
//! - `CURSOR_ERROR_KEY`: event error counter format, `dot` (`op.ERROR`, default)
//!   or `underscore` (`op_ERROR`)
//! - `CURSOR_STACK_NAMES`: resolve span names from the call stack (default: false)
//! - `CURSOR_VENDOR_MARKERS`: comma-separated path markers of dependency code
//!
//! # Observability
//!
//! - `METRICS_PORT`: Prometheus endpoint port (default: 0 = disabled)
//! - `RUST_LOG`: log filter (default: `info`)
//! - `LOG_FORMAT`: `pretty` (default) or `json`

use std::env;
use std::str::FromStr;

use crate::cursor::ErrorKeyFormat;
use crate::error::{CursorError, CursorResult};
use crate::frame::DEFAULT_VENDOR_MARKERS;
use crate::labels::LabelSchema;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(CursorError::ConfigError(format!(
                "Unknown log format '{other}', expected pretty or json"
            ))),
        }
    }
}

/// Instrumentation configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// let instrumentation = Instrumentation::from_config(&config);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Process Identity
    // =========================================================================
    /// Application name label
    pub app_name: String,

    /// Application version label
    pub app_version: String,

    // =========================================================================
    // Cursor Configuration
    // =========================================================================
    /// Label set exported with the cursor summary
    pub label_schema: LabelSchema,

    /// Format of the error counter key written to structured events
    pub error_key_format: ErrorKeyFormat,

    /// Resolve operation and parent names by walking the call stack.
    /// Requires the `backtrace` feature; ignored without it.
    pub stack_names: bool,

    /// Path markers identifying dependency code
    pub vendor_markers: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (0 = disabled)
    pub metrics_port: u16,

    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `CursorError::ConfigError` if any value is malformed
    /// (e.g., non-numeric METRICS_PORT, unknown label schema).
    pub fn from_env() -> CursorResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> CursorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            // Identity
            app_name: lookup("APP_NAME").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            app_version: lookup("APP_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),

            // Cursor
            label_schema: parse_env(&lookup, "CURSOR_LABEL_SCHEMA", LabelSchema::V2)?,
            error_key_format: parse_env(&lookup, "CURSOR_ERROR_KEY", ErrorKeyFormat::Dotted)?,
            stack_names: parse_env(&lookup, "CURSOR_STACK_NAMES", false)?,
            vendor_markers: parse_vendor_markers(lookup("CURSOR_VENDOR_MARKERS")),

            // Observability
            metrics_port: parse_env(&lookup, "METRICS_PORT", 0)?,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format: parse_env(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `CursorError::ConfigError` if validation fails.
    fn validate(&self) -> CursorResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(CursorError::ConfigError(
                "APP_NAME must not be empty".to_string(),
            ));
        }

        if self.vendor_markers.is_empty() {
            return Err(CursorError::ConfigError(
                "CURSOR_VENDOR_MARKERS must contain at least one marker".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

}

/// Parse a variable into the specified type with a default value.
fn parse_env<T, F>(lookup: &F, name: &str, default: T) -> CursorResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val
            .parse()
            .map_err(|e| CursorError::ConfigError(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}

/// Parse vendor path markers.
///
/// Default: `@`, cargo registry/git checkouts and the toolchain sources.
fn parse_vendor_markers(raw: Option<String>) -> Vec<String> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| split_markers(&s))
        .unwrap_or_else(default_vendor_markers)
}

fn split_markers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_vendor_markers() -> Vec<String> {
    DEFAULT_VENDOR_MARKERS.iter().map(|m| m.to_string()).collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Identity
            app_name: env!("CARGO_PKG_NAME").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            // Cursor
            label_schema: LabelSchema::V2,
            error_key_format: ErrorKeyFormat::Dotted,
            stack_names: false,
            vendor_markers: default_vendor_markers(),
            // Observability
            metrics_port: 0,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.app_name, "rk_cursor");
        assert_eq!(config.label_schema, LabelSchema::V2);
        assert_eq!(config.error_key_format, ErrorKeyFormat::Dotted);
        assert!(!config.stack_names);
        assert_eq!(config.vendor_markers.len(), DEFAULT_VENDOR_MARKERS.len());
        assert!(!config.metrics_enabled());
    }

    #[test]
    fn test_metrics_addr() {
        let config = Config::default();
        assert!(config.metrics_addr().is_none());

        let config = Config {
            metrics_port: 9090,
            ..Config::default()
        };
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_split_markers() {
        assert_eq!(
            split_markers(" @ , /third_party/ ,,"),
            vec!["@".to_string(), "/third_party/".to_string()]
        );
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_empty_app_name() {
        let config = Config {
            app_name: "  ".to_string(),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("APP_NAME"));
    }

    #[test]
    fn test_validate_empty_vendor_markers() {
        let config = Config {
            vendor_markers: vec![],
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("CURSOR_VENDOR_MARKERS")
        );
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.app_name, "rk_cursor");
        assert_eq!(config.label_schema, LabelSchema::V2);
        assert_eq!(config.metrics_port, 0);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.vendor_markers, default_vendor_markers());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("APP_NAME", "orders"),
            ("CURSOR_LABEL_SCHEMA", "v1"),
            ("CURSOR_ERROR_KEY", "underscore"),
            ("CURSOR_STACK_NAMES", "true"),
            ("CURSOR_VENDOR_MARKERS", "/vendor/, /third_party/"),
            ("METRICS_PORT", "9100"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.app_name, "orders");
        assert_eq!(config.label_schema, LabelSchema::V1);
        assert_eq!(config.error_key_format, ErrorKeyFormat::Underscore);
        assert!(config.stack_names);
        assert_eq!(config.vendor_markers, ["/vendor/", "/third_party/"]);
        assert_eq!(config.metrics_addr().unwrap().port(), 9100);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_lookup_invalid_metrics_port() {
        let result = Config::from_lookup(lookup(&[("METRICS_PORT", "abc")]));
        assert!(result.unwrap_err().to_string().contains("Invalid METRICS_PORT"));
    }

    #[test]
    fn test_from_lookup_unknown_label_schema() {
        let result = Config::from_lookup(lookup(&[("CURSOR_LABEL_SCHEMA", "v3")]));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Invalid CURSOR_LABEL_SCHEMA"));
        assert!(message.contains("v3"));
    }

    #[test]
    fn test_from_lookup_invalid_bool_and_format() {
        assert!(Config::from_lookup(lookup(&[("CURSOR_STACK_NAMES", "yes")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CURSOR_ERROR_KEY", "dash")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_from_lookup_blank_vendor_markers_use_defaults() {
        let config = Config::from_lookup(lookup(&[("CURSOR_VENDOR_MARKERS", "   ")])).unwrap();
        assert_eq!(config.vendor_markers, default_vendor_markers());
    }

    #[test]
    fn test_from_lookup_separator_only_vendor_markers_fail() {
        let result = Config::from_lookup(lookup(&[("CURSOR_VENDOR_MARKERS", " , ")]));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("CURSOR_VENDOR_MARKERS")
        );
    }

    #[test]
    fn test_from_lookup_empty_app_name_fails_validation() {
        let result = Config::from_lookup(lookup(&[("APP_NAME", " ")]));
        assert!(result.unwrap_err().to_string().contains("APP_NAME"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
