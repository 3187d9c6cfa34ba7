//! Configuration handling for the database administration server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use clap::Parser;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "dbadmin-server")]
#[command(author, version, about = "Session-based SQL administration backend with AI assistance")]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "DBADMIN_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "DBADMIN_HTTP_PORT")]
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DBADMIN_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBADMIN_JSON_LOGS")]
    pub json_logs: bool,

    /// Database connect timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DBADMIN_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Timeout for non-streaming AI requests in seconds
    #[arg(long, default_value_t = DEFAULT_AI_TIMEOUT_SECS, env = "DBADMIN_AI_TIMEOUT")]
    pub ai_timeout: u64,

    /// A chat stream is completed after this many seconds without upstream data
    #[arg(
        long,
        default_value_t = DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
        env = "DBADMIN_STREAM_IDLE_TIMEOUT"
    )]
    pub stream_idle_timeout: u64,

    /// Allowed CORS origin; empty disables CORS
    #[arg(long, default_value = DEFAULT_CORS_ORIGIN, env = "DBADMIN_CORS_ORIGIN")]
    pub cors_origin: String,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            log_level: "info".to_string(),
            json_logs: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            ai_timeout: DEFAULT_AI_TIMEOUT_SECS,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn ai_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.ai_timeout)
    }

    pub fn stream_idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.cors_origin, DEFAULT_CORS_ORIGIN);
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_timeout_durations() {
        let config = Config {
            connect_timeout: 15,
            ai_timeout: 90,
            stream_idle_timeout: 5,
            ..Config::default()
        };
        assert_eq!(config.connect_timeout_duration(), Duration::from_secs(15));
        assert_eq!(config.ai_timeout_duration(), Duration::from_secs(90));
        assert_eq!(config.stream_idle_timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_cli_arguments() {
        let config = Config::try_parse_from([
            "dbadmin-server",
            "--http-port",
            "9000",
            "--cors-origin",
            "",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert!(config.cors_origin.is_empty());
        assert!(config.json_logs);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT_SECS);
    }
}
