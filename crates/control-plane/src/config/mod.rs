// Server configuration
//
// Loaded from the environment after dotenvy. Without DATABASE_URL the server
// runs entirely in-process (storage, broker and job queue in memory).

use axum::http::HeaderValue;

use crate::broker::DEFAULT_SUBSCRIBER_BUFFER;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL URL; `None` means dev mode
    pub database_url: Option<String>,
    /// LISTEN/NOTIFY URL (default: `database_url`)
    pub broker_url: Option<String>,
    /// Origins allowed cross-origin; empty means same-origin only
    pub cors_origins: Vec<HeaderValue>,
    /// Run the alert / digest / retention runtime in this process
    pub run_workers: bool,
    /// Per-connection broker buffer
    pub subscriber_buffer: usize,
    /// Path prefix for the API routes, e.g. "/api"
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            broker_url: None,
            cors_origins: Vec::new(),
            run_workers: true,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            api_prefix: String::new(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `HOST` / `PORT`: bind address (default: 0.0.0.0:3000)
    /// - `DATABASE_URL`: PostgreSQL URL (default: unset, in-memory)
    /// - `BROKER_URL`: LISTEN/NOTIFY URL (default: DATABASE_URL)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins
    /// - `RUN_WORKERS`: run workers in-process (default: true)
    /// - `SUBSCRIBER_BUFFER`: per-connection buffer (default: 1024)
    /// - `API_PREFIX`: route prefix (default: empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let database_url = non_empty_env("DATABASE_URL");

        Self {
            host: non_empty_env("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            broker_url: non_empty_env("BROKER_URL").or_else(|| database_url.clone()),
            database_url,
            cors_origins: non_empty_env("CORS_ALLOWED_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
            run_workers: std::env::var("RUN_WORKERS")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.run_workers),
            subscriber_buffer: std::env::var("SUBSCRIBER_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.subscriber_buffer),
            api_prefix: std::env::var("API_PREFIX").unwrap_or_default(),
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.database_url.is_none()
    }

    /// `host:port`, resolved by the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_origins(value: &str) -> Vec<HeaderValue> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.run_workers);
        assert!(config.is_dev_mode());
        assert_eq!(config.subscriber_buffer, 1024);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins("https://a.example.com, https://b.example.com,,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1], "https://b.example.com");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
