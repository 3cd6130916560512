//! Email alerts for actionable findings, delivered through the SendGrid v3 API.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::models::{Finding, FindingsInput, NotificationOutcome};
use crate::workstation::Workstation;

pub const ALERT_SUBJECT: &str = "Critical Radiology Findings Alert";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
});

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

pub struct Notifier {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    from: String,
}

impl Notifier {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            from: from.into(),
        }
    }

    /// Email `findings` to `email`, or to the stored address when none is given.
    pub async fn notify(
        &self,
        station: &Workstation,
        findings: FindingsInput,
        email: Option<String>,
    ) -> NotificationOutcome {
        let recipient = match email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
            Some(explicit) if !is_valid_email(&explicit) => {
                warn!(email = %explicit, "Refusing to notify an invalid address");
                return NotificationOutcome::failed("invalid_email");
            }
            Some(explicit) => explicit,
            None => {
                let stored = station.notification_email().await;
                if stored.is_empty() {
                    info!("No notification email configured");
                    return NotificationOutcome::failed("no_email");
                }
                stored
            }
        };

        let Some(api_key) = self.api_key.as_deref() else {
            warn!("SENDGRID_API_KEY not set, notification not sent");
            return NotificationOutcome::failed("no_api_key");
        };

        let findings = findings.into_findings();
        let payload = self.mail_payload(&recipient, &findings);
        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));

        match self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().as_u16() == 202 => {
                info!(email = %recipient, findings = findings.len(), "Notification sent");
                NotificationOutcome::sent(recipient)
            }
            Ok(response) => {
                let code = response.status().as_u16();
                warn!(status = code, "Email provider rejected the notification");
                NotificationOutcome::failed(format!("send_failed_code_{code}"))
            }
            Err(e) => {
                error!(error = %e, "Failed to send notification");
                NotificationOutcome::failed(e.to_string())
            }
        }
    }

    /// Store a new address. Invalid addresses leave the stored one untouched.
    pub async fn set_email(&self, station: &Workstation, address: &str) -> bool {
        let address = address.trim();
        if !is_valid_email(address) {
            warn!(email = %address, "Invalid email format");
            return false;
        }
        station.store_notification_email(address).await;
        info!(email = %address, "Notification email updated");
        true
    }

    pub async fn get_email(&self, station: &Workstation) -> String {
        station.notification_email().await
    }

    fn mail_payload(&self, recipient: &str, findings: &[Finding]) -> Value {
        json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.from },
            "subject": ALERT_SUBJECT,
            "content": [{ "type": "text/html", "value": format_email_html(findings) }],
        })
    }
}

pub fn format_email_html(findings: &[Finding]) -> String {
    let items: String = findings
        .iter()
        .map(|f| {
            format!(
                "<li><strong>Finding:</strong> {}<br><strong>Urgency:</strong> {}<br><strong>Recommendation:</strong> {}</li>",
                escape_html(&f.finding),
                escape_html(&f.urgency.to_string()),
                escape_html(&f.recommendation),
            )
        })
        .collect();
    format!("<h2>{ALERT_SUBJECT}</h2><ul>{items}</ul>")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
