//! # Email Delivery
//!
//! [`MailNotifier`] sends codes through a transactional mail API speaking the
//! Resend wire format: `POST {api_url}/emails` with a bearer key and a JSON
//! body of `from`, `to`, `subject`, `html` and `text`.
//!
//! Status handling:
//!
//! | Response             | Result                       |
//! |----------------------|------------------------------|
//! | 2xx                  | delivered                    |
//! | 4xx                  | [`NotifyError::Rejected`]    |
//! | 5xx, timeout, socket | [`NotifyError::Transport`]   |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::{Delivery, Notifier, NotifyError};

/// Default endpoint of the mail API.
pub const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com";

/// Default per-request timeout.
pub const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`MailNotifier`].
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Base URL of the mail API, without the `/emails` path.
    pub api_url: String,
    /// Bearer key for the mail API.
    pub api_key: String,
    /// Sender address, e.g. `Statements <statements@example.com>`.
    pub from: String,
    /// Public base URL of the statement site. When set, the message links
    /// to `{site_url}/statements/verify?id={resource_id}`.
    pub site_url: Option<String>,
    pub timeout: Duration,
}

impl MailConfig {
    /// Configuration against the default endpoint with the default timeout.
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_MAIL_API_URL.to_string(),
            api_key: api_key.into(),
            from: from.into(),
            site_url: None,
            timeout: DEFAULT_MAIL_TIMEOUT,
        }
    }
}

/// Request body for `POST /emails`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct SendReceipt {
    id: String,
}

/// Sends codes by email over HTTP.
#[derive(Debug, Clone)]
pub struct MailNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
    site_url: Option<String>,
}

impl MailNotifier {
    pub fn new(config: MailConfig) -> Result<Self, NotifyError> {
        if config.api_key.trim().is_empty() {
            return Err(NotifyError::Misconfigured("mail API key is empty".into()));
        }
        if config.from.trim().is_empty() {
            return Err(NotifyError::Misconfigured("sender address is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                        .map_err(|_| {
                            NotifyError::Misconfigured("invalid API key characters".into())
                        })?,
                );
                headers
            })
            .build()
            .map_err(|e| NotifyError::Misconfigured(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/emails", config.api_url.trim_end_matches('/'));
        let site_url = config
            .site_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            client,
            endpoint,
            from: config.from,
            site_url,
        })
    }

    /// Builds the message for one delivery.
    pub fn compose(&self, delivery: &Delivery) -> MailMessage {
        let code = delivery.secret.expose();
        let expiry = format_expiry(delivery.expires_at);
        let title = escape_html(&delivery.title);
        let link = self
            .site_url
            .as_ref()
            .map(|site| format!("{site}/statements/verify?id={}", delivery.resource_id));

        let mut html = format!(
            "<p>Your one-time code for <strong>{title}</strong> is:</p>\
             <p style=\"font-size:24px;letter-spacing:4px\"><strong>{code}</strong></p>\
             <p>This code expires at {expiry} and can be used once.</p>"
        );
        let mut text = format!(
            "Your one-time code for {} is {code}.\nThis code expires at {expiry} and can be used once.\n",
            delivery.title
        );
        if let Some(link) = &link {
            html.push_str(&format!("<p><a href=\"{link}\">Open your statement</a></p>"));
            text.push_str(&format!("Open your statement: {link}\n"));
        }

        MailMessage {
            from: self.from.clone(),
            to: vec![delivery.contact.clone()],
            subject: format!("Your statement: {}", delivery.title),
            html,
            text,
        }
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send(&self, delivery: Delivery) -> Result<(), NotifyError> {
        let message = self.compose(&delivery);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let reason = format!("HTTP {status}: {body}");
            return Err(if status.is_client_error() {
                NotifyError::Rejected(reason)
            } else {
                NotifyError::Transport(reason)
            });
        }

        match resp.json::<SendReceipt>().await {
            Ok(receipt) => tracing::info!(
                resource_id = delivery.resource_id,
                message_id = %receipt.id,
                "code emailed"
            ),
            Err(_) => tracing::info!(resource_id = delivery.resource_id, "code emailed"),
        }
        Ok(())
    }
}

fn format_expiry(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
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
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::OtpCode;
    use chrono::TimeZone;

    fn delivery() -> Delivery {
        Delivery {
            contact: "patient@example.com".into(),
            resource_id: 7,
            title: "January <2025> Statement".into(),
            secret: OtpCode::from("042911"),
            expires_at: Utc.with_ymd_and_hms(2025, 1, 31, 10, 5, 0).unwrap(),
        }
    }

    #[test]
    fn compose_includes_code_expiry_and_link() {
        let mut config = MailConfig::new("re_test", "Statements <statements@example.com>");
        config.site_url = Some("https://statements.example.com/".into());
        let notifier = MailNotifier::new(config).unwrap();

        let message = notifier.compose(&delivery());
        assert_eq!(message.to, ["patient@example.com"]);
        assert_eq!(message.subject, "Your statement: January <2025> Statement");
        assert!(message.html.contains("<strong>042911</strong>"));
        assert!(message.html.contains("January &lt;2025&gt; Statement"));
        assert!(message.html.contains("2025-01-31 10:05 UTC"));
        assert!(message
            .html
            .contains("https://statements.example.com/statements/verify?id=7"));
        assert!(message.text.contains("042911"));
    }

    #[test]
    fn compose_without_site_url_has_no_link() {
        let notifier = MailNotifier::new(MailConfig::new("re_test", "statements@example.com")).unwrap();
        let message = notifier.compose(&delivery());
        assert!(!message.html.contains("href"));
        assert!(!message.text.contains("http"));
    }

    #[test]
    fn empty_key_or_sender_is_refused() {
        assert!(matches!(
            MailNotifier::new(MailConfig::new("  ", "statements@example.com")),
            Err(NotifyError::Misconfigured(_))
        ));
        assert!(matches!(
            MailNotifier::new(MailConfig::new("re_test", "")),
            Err(NotifyError::Misconfigured(_))
        ));
    }

    #[test]
    fn key_with_control_characters_is_refused() {
        assert!(matches!(
            MailNotifier::new(MailConfig::new("re_\ntest", "statements@example.com")),
            Err(NotifyError::Misconfigured(_))
        ));
    }
}
