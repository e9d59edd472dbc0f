// Worker configuration
//
// Every value has a default so a worker runtime can be built with no
// environment at all (dev mode, tests).

use std::time::Duration;

use pulseboard_durable::RetryPolicy;
use uuid::Uuid;

/// Default cron for the nightly digest (midnight)
pub const DEFAULT_DIGEST_CRON: &str = "0 0 * * *";
/// Default cron for data retention (02:00)
pub const DEFAULT_RETENTION_CRON: &str = "0 2 * * *";

/// Configuration for the alert / digest / retention runtime
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifies this process in job claims
    pub worker_id: String,
    /// Errors in the trailing window that trigger an alert
    pub alert_threshold: u64,
    /// Trailing window the alert worker counts over
    pub alert_window: Duration,
    /// Events older than this many days are deleted
    pub retention_days: u32,
    pub digest_cron: String,
    pub retention_cron: String,
    /// Retry policy applied to every job this runtime enqueues
    pub retry_policy: RetryPolicy,
    /// Maximum jobs executed at once
    pub concurrency: usize,
    pub mail: MailConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            alert_threshold: 10,
            alert_window: Duration::from_secs(60),
            retention_days: 30,
            digest_cron: DEFAULT_DIGEST_CRON.to_string(),
            retention_cron: DEFAULT_RETENTION_CRON.to_string(),
            retry_policy: RetryPolicy::exponential(),
            concurrency: 10,
            mail: MailConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `WORKER_ID`: claim identity (default: generated)
    /// - `ALERT_ERROR_THRESHOLD`: alert threshold (default: 10)
    /// - `ALERT_WINDOW_SECS`: alert window in seconds (default: 60)
    /// - `RETENTION_DAYS`: retention horizon, at least one day (default: 30)
    /// - `DIGEST_CRON` / `RETENTION_CRON`: recurring schedules
    /// - `JOB_MAX_ATTEMPTS`: attempts per job (default: 3)
    /// - `JOB_RETRY_INITIAL_MS`: first retry delay (default: 1000)
    /// - `WORKER_CONCURRENCY`: concurrent jobs (default: 10)
    /// - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USER` / `SMTP_PASS` / `SMTP_FROM`: SMTP relay
    /// - `MAIL_API_URL` / `MAIL_API_KEY` / `MAIL_FROM`: mail API
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = env_parse("JOB_MAX_ATTEMPTS").unwrap_or(3u32);
        let initial_ms = env_parse("JOB_RETRY_INITIAL_MS").unwrap_or(1000u64);

        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            alert_threshold: env_parse("ALERT_ERROR_THRESHOLD").unwrap_or(defaults.alert_threshold),
            alert_window: env_parse("ALERT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.alert_window),
            retention_days: env_parse("RETENTION_DAYS")
                .filter(|days: &u32| *days > 0)
                .unwrap_or(defaults.retention_days),
            digest_cron: std::env::var("DIGEST_CRON").unwrap_or(defaults.digest_cron),
            retention_cron: std::env::var("RETENTION_CRON").unwrap_or(defaults.retention_cron),
            retry_policy: RetryPolicy::exponential()
                .with_max_attempts(max_attempts.max(1))
                .with_initial_interval(Duration::from_millis(initial_ms)),
            concurrency: env_parse("WORKER_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.concurrency),
            mail: MailConfig::from_env(),
        }
    }
}

/// Default SMTP submission port
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Mail delivery settings. SMTP wins when `SMTP_HOST` is set, then the HTTP
/// mail API; with neither, mail is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp: Option<SmtpConfig>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// SMTP relay. Port 465 uses implicit TLS, any other port upgrades with
/// STARTTLS when the server offers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Which transport a `MailConfig` selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransport {
    Smtp,
    Http,
    Log,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp: None,
            api_url: None,
            api_key: None,
            from: "PulseBoard <alerts@pulseboard.dev>".to_string(),
        }
    }
}

impl MailConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let smtp = non_empty_env("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: env_parse("SMTP_PORT").unwrap_or(DEFAULT_SMTP_PORT),
            username: non_empty_env("SMTP_USER"),
            password: non_empty_env("SMTP_PASS"),
        });
        Self {
            smtp,
            api_url: non_empty_env("MAIL_API_URL"),
            api_key: non_empty_env("MAIL_API_KEY"),
            from: non_empty_env("MAIL_FROM")
                .or_else(|| non_empty_env("SMTP_FROM"))
                .unwrap_or(defaults.from),
        }
    }

    pub fn transport(&self) -> MailTransport {
        if self.smtp.is_some() {
            MailTransport::Smtp
        } else if self.api_url.is_some() {
            MailTransport::Http
        } else {
            MailTransport::Log
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.alert_threshold, 10);
        assert_eq!(config.alert_window, Duration::from_secs(60));
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.digest_cron, "0 0 * * *");
        assert_eq!(config.retention_cron, "0 2 * * *");
        assert_eq!(config.retry_policy.max_attempts, 3);
        assert!(config.mail.api_url.is_none());
        assert_eq!(config.mail.transport(), MailTransport::Log);
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        std::env::set_var("PULSEBOARD_TEST_GARBAGE_NUMBER", "ten");
        assert_eq!(env_parse::<u64>("PULSEBOARD_TEST_GARBAGE_NUMBER"), None);
        std::env::set_var("PULSEBOARD_TEST_PADDED_NUMBER", " 42 ");
        assert_eq!(env_parse::<u64>("PULSEBOARD_TEST_PADDED_NUMBER"), Some(42));
    }

    #[test]
    fn test_retention_days_rejects_negative_and_zero() {
        for raw in ["-1", "0", "99999999999"] {
            std::env::set_var("RETENTION_DAYS", raw);
            assert_eq!(WorkerConfig::from_env().retention_days, 30, "RETENTION_DAYS={raw}");
        }
        std::env::set_var("RETENTION_DAYS", "7");
        assert_eq!(WorkerConfig::from_env().retention_days, 7);
        std::env::remove_var("RETENTION_DAYS");
    }

    #[test]
    fn test_smtp_settings_from_env() {
        std::env::set_var("SMTP_HOST", "smtp.example.com");
        std::env::set_var("SMTP_USER", "mailer");
        std::env::set_var("SMTP_PASS", "hunter2");
        std::env::set_var("SMTP_FROM", "alerts@example.com");

        let mail = MailConfig::from_env();
        assert_eq!(
            mail.smtp,
            Some(SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: DEFAULT_SMTP_PORT,
                username: Some("mailer".to_string()),
                password: Some("hunter2".to_string()),
            })
        );
        assert_eq!(mail.from, "alerts@example.com");
        assert_eq!(mail.transport(), MailTransport::Smtp);

        for key in ["SMTP_HOST", "SMTP_USER", "SMTP_PASS", "SMTP_FROM"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_smtp_takes_precedence_over_http() {
        let mut mail = MailConfig {
            api_url: Some("https://mail.example.com/send".to_string()),
            ..MailConfig::default()
        };
        assert_eq!(mail.transport(), MailTransport::Http);

        mail.smtp = Some(SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 465,
            username: None,
            password: None,
        });
        assert_eq!(mail.transport(), MailTransport::Smtp);
    }
}
