//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup into a [`Config`] that is handed to
//! the web layer through [`crate::web::AppState`].

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use tracing::warn;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for HMAC-SHA256 webhook signatures
    pub webhook_secret: Option<String>,

    /// SQLite connection URL
    pub database_url: String,

    /// Maximum number of pooled database connections
    pub db_max_connections: u32,

    /// Host for the web server to bind to
    pub host: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Default log filter when RUST_LOG is unset
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Number of senders reported in the stats breakdown
    pub stats_top_senders: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            webhook_secret: None,
            database_url: "sqlite://data/messages.db".to_string(),
            db_max_connections: 5,
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            request_timeout_secs: 30,
            stats_top_senders: 10,
        }
    }
}

/// An environment variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvVar {
    pub name: &'static str,
    pub value: String,
    pub error: String,
}

impl InvalidEnvVar {
    /// Emit the fallback as a warning event.
    pub fn log(&self) {
        warn!(
            env_var = self.name,
            value = %self.value,
            error = %self.error,
            "Invalid value, using default"
        );
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Variables that fail to parse fall back to their defaults and are
    /// returned alongside the config, since the tracing subscriber is built
    /// from this config and cannot report them yet.
    pub fn from_env() -> (Self, Vec<InvalidEnvVar>) {
        let defaults = Config::default();
        let mut invalid = Vec::new();

        let config = Config {
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),

            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),

            db_max_connections: parse_or(
                "DB_MAX_CONNECTIONS",
                defaults.db_max_connections,
                &mut invalid,
            ),

            host: env::var("HOST").unwrap_or(defaults.host),

            port: parse_or("PORT", defaults.port, &mut invalid),

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            log_format: parse_or("LOG_FORMAT", defaults.log_format, &mut invalid),

            request_timeout_secs: parse_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
                &mut invalid,
            ),

            stats_top_senders: parse_or(
                "STATS_TOP_SENDERS",
                defaults.stats_top_senders,
                &mut invalid,
            ),
        };

        (config, invalid)
    }

    /// Whether a non-empty webhook secret is configured.
    pub fn is_webhook_secret_configured(&self) -> bool {
        self.webhook_secret
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// invalid. Invalid values are pushed onto `invalid`.
fn parse_or<T>(name: &'static str, default: T, invalid: &mut Vec<InvalidEnvVar>) -> T
where
    T: FromStr,
    T::Err: Display,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            invalid.push(InvalidEnvVar {
                name,
                value: raw,
                error: e.to_string(),
            });
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_valid() {
        let mut invalid = Vec::new();
        env::set_var("MSGHOOK_TEST_PORT", "9090");
        let result: u16 = parse_or("MSGHOOK_TEST_PORT", 8000, &mut invalid);
        assert_eq!(result, 9090);
        assert!(invalid.is_empty());
        env::remove_var("MSGHOOK_TEST_PORT");
    }

    #[test]
    fn test_parse_or_invalid_falls_back() {
        let mut invalid = Vec::new();
        env::set_var("MSGHOOK_TEST_TIMEOUT", "soon");
        let result: u64 = parse_or("MSGHOOK_TEST_TIMEOUT", 30, &mut invalid);
        assert_eq!(result, 30);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].name, "MSGHOOK_TEST_TIMEOUT");
        assert_eq!(invalid[0].value, "soon");
        assert!(!invalid[0].error.is_empty());
        env::remove_var("MSGHOOK_TEST_TIMEOUT");
    }

    #[test]
    fn test_parse_or_default() {
        let mut invalid = Vec::new();
        let result: u32 = parse_or("MSGHOOK_NONEXISTENT_VAR", 10, &mut invalid);
        assert_eq!(result, 10);
        assert!(invalid.is_empty());
    }

    #[test]
    fn test_from_env_reports_invalid_values() {
        env::set_var("STATS_TOP_SENDERS", "many");
        let (config, invalid) = Config::from_env();
        env::remove_var("STATS_TOP_SENDERS");

        assert_eq!(config.stats_top_senders, 10);
        assert!(invalid.iter().any(|v| v.name == "STATS_TOP_SENDERS" && v.value == "many"));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" TEXT ".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_secret_configured() {
        let mut config = Config::default();
        assert!(!config.is_webhook_secret_configured());

        config.webhook_secret = Some(String::new());
        assert!(!config.is_webhook_secret_configured());

        config.webhook_secret = Some("abc".to_string());
        assert!(config.is_webhook_secret_configured());
    }

    #[test]
    fn test_bind_address() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8123,
            ..Config::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:8123");
    }
}
