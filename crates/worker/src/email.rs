// Email rendering and delivery
//
// Rendering is pure; delivery goes through the core `Mailer` trait so the
// workers never know which transport is in use.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use parking_lot::Mutex;
use pulseboard_core::{EmailMessage, Mailer, PulseError, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{MailConfig, MailTransport, SmtpConfig};

/// Upper bound on one delivery attempt. Must stay well below the pool's
/// stale-claim threshold or a hung send gets the job handed out twice.
pub const MAIL_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// One row of the digest table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub event_count: u64,
    pub error_count: u64,
}

pub fn render_alert_email(to: &str, project_name: &str, error_count: u64) -> EmailMessage {
    let name = escape_html(project_name);
    EmailMessage {
        to: to.to_string(),
        subject: format!("⚠️ Alert: High error rate on {project_name}"),
        html: format!(
            "<h2>PulseBoard Alert</h2>\
             <p>Your project <strong>{name}</strong> has exceeded the error threshold.</p>\
             <p>Errors in the last minute: <strong>{error_count}</strong></p>\
             <p>Log in to your dashboard to investigate.</p>"
        ),
    }
}

pub fn render_digest_email(to: &str, user_name: &str, projects: &[ProjectSummary]) -> EmailMessage {
    const CELL: &str = "padding: 8px; border: 1px solid #ddd;";

    let rows: String = projects
        .iter()
        .map(|p| {
            format!(
                "<tr><td style=\"{CELL}\">{}</td><td style=\"{CELL}\">{}</td><td style=\"{CELL}\">{}</td></tr>",
                escape_html(&p.name),
                p.event_count,
                p.error_count
            )
        })
        .collect();

    EmailMessage {
        to: to.to_string(),
        subject: "📊 Your PulseBoard daily digest".to_string(),
        html: format!(
            "<h2>Good morning, {}!</h2>\
             <p>Here's your daily summary for the past 24 hours:</p>\
             <table style=\"border-collapse: collapse;\">\
             <thead><tr><th style=\"{CELL}\">Project</th><th style=\"{CELL}\">Total Events</th><th style=\"{CELL}\">Errors</th></tr></thead>\
             <tbody>{rows}</tbody>\
             </table>",
            escape_html(user_name)
        ),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Mailers
// ============================================================================

/// Writes messages to the log instead of sending them (dev mode)
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "Email (not sent, no mail API configured)");
        debug!(html = %message.html, "Email body");
        Ok(())
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends through a transactional mail API: JSON POST with a bearer key
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(MAIL_SEND_TIMEOUT)
            .build()
            .map_err(|e| PulseError::config(format!("mail HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let body = MailRequest {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PulseError::delivery(format!("mail API unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PulseError::delivery(format!(
                "mail API returned {status}: {text}"
            )));
        }

        debug!(to = %message.to, "Email sent");
        Ok(())
    }
}

/// Sends through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport without connecting; the first send opens the session.
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| PulseError::config(format!("invalid sender address {from}: {e}")))?;
        let tls = TlsParameters::new(config.host.clone())
            .map_err(|e| PulseError::config(format!("SMTP TLS setup: {e}")))?;
        let tls = if config.port == 465 {
            Tls::Wrapper(tls)
        } else {
            Tls::Opportunistic(tls)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls)
            .timeout(Some(MAIL_SEND_TIMEOUT));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let to: Mailbox = message.to.parse().map_err(|e| {
            PulseError::delivery(format!("invalid recipient {}: {e}", message.to))
        })?;
        let email = lettre::Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)
            .map_err(|e| PulseError::delivery(format!("could not build message: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| PulseError::delivery(format!("SMTP send failed: {e}")))?;

        debug!(to = %message.to, "Email sent over SMTP");
        Ok(())
    }
}

/// Picks the mailer for a configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match (config.transport(), &config.smtp, &config.api_url) {
        (MailTransport::Smtp, Some(smtp), _) => {
            info!(host = %smtp.host, port = smtp.port, "Sending mail over SMTP");
            Arc::new(SmtpMailer::new(smtp, &config.from)?)
        }
        (MailTransport::Http, _, Some(url)) => {
            info!(url = %url, "Sending mail through the HTTP mail API");
            Arc::new(HttpMailer::new(
                url.clone(),
                config.api_key.clone(),
                config.from.clone(),
            )?)
        }
        _ => Arc::new(LogMailer),
    };
    Ok(mailer)
}

/// Keeps every message in memory. Recipients listed with `fail_for` are
/// rejected with a delivery error.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.failing.lock().insert(recipient.into());
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        if self.failing.lock().contains(&message.to) {
            return Err(PulseError::delivery(format!(
                "recipient {} rejected",
                message.to
            )));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_email_mentions_project_and_count() {
        let msg = render_alert_email("owner@example.com", "Checkout", 12);
        assert_eq!(msg.to, "owner@example.com");
        assert_eq!(msg.subject, "⚠️ Alert: High error rate on Checkout");
        assert!(msg.html.contains("<strong>Checkout</strong>"));
        assert!(msg.html.contains("Errors in the last minute: <strong>12</strong>"));
    }

    #[test]
    fn test_digest_email_has_one_row_per_project() {
        let projects = vec![
            ProjectSummary {
                name: "api".to_string(),
                event_count: 40,
                error_count: 3,
            },
            ProjectSummary {
                name: "web".to_string(),
                event_count: 0,
                error_count: 0,
            },
        ];
        let msg = render_digest_email("a@example.com", "Ada", &projects);
        assert_eq!(msg.subject, "📊 Your PulseBoard daily digest");
        assert!(msg.html.contains("Good morning, Ada!"));
        assert_eq!(msg.html.matches("<tr>").count(), 3);
        assert!(msg.html.contains(">40</td>"));
    }

    #[test]
    fn test_names_are_escaped() {
        let msg = render_alert_email("a@example.com", "<script>", 1);
        assert!(msg.html.contains("&lt;script&gt;"));
        assert!(!msg.html.contains("<script>"));
    }

    #[tokio::test]
    async fn test_recording_mailer_failures() {
        let mailer = RecordingMailer::new();
        mailer.fail_for("bad@example.com");

        let ok = render_alert_email("good@example.com", "p", 1);
        let bad = render_alert_email("bad@example.com", "p", 1);

        mailer.send(ok).await.unwrap();
        let err = mailer.send(bad).await.unwrap_err();
        assert!(matches!(err, PulseError::Delivery(_)));
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn test_mailer_selection_builds_every_transport() {
        assert!(mailer_from_config(&MailConfig::default()).is_ok());
        assert!(mailer_from_config(&MailConfig {
            api_url: Some("http://localhost:9/send".to_string()),
            api_key: Some("k".to_string()),
            ..MailConfig::default()
        })
        .is_ok());
        assert!(mailer_from_config(&MailConfig {
            smtp: Some(smtp_config(2525)),
            ..MailConfig::default()
        })
        .is_ok());
    }

    #[test]
    fn test_bad_sender_is_a_config_error() {
        let err = SmtpMailer::new(&smtp_config(587), "not an address").err().unwrap();
        assert!(matches!(err, PulseError::Configuration(_)));
    }

    #[test]
    fn test_send_timeout_is_below_stale_threshold() {
        let pool = pulseboard_durable::WorkerPoolConfig::new(vec![]);
        assert!(MAIL_SEND_TIMEOUT * 2 <= pool.stale_threshold);
    }

    #[tokio::test]
    async fn test_unreachable_smtp_server_is_a_delivery_error() {
        // Nothing listens on the discard port
        let mailer = SmtpMailer::new(&smtp_config(9), "alerts@pulseboard.dev").unwrap();
        let err = mailer
            .send(render_alert_email("owner@example.com", "p", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Delivery(_)));
        assert!(err.is_retryable());
    }

    fn smtp_config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        }
    }
}
