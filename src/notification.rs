use crate::alerts::ActiveAlert;
use crate::email::{EmailAddress, EmailContent, EmailMessage, Recipients};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

const SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub alerts: Vec<ActiveAlert>,
    pub subject: String,
    pub plain_text: String,
    pub html: String,
    pub recipient: String,
    pub sender: String,
}

impl NotificationPayload {
    pub fn to_message(&self) -> EmailMessage {
        EmailMessage {
            content: EmailContent {
                subject: self.subject.clone(),
                plain_text: self.plain_text.clone(),
                html: self.html.clone(),
            },
            recipients: Recipients {
                to: vec![EmailAddress {
                    address: self.recipient.clone(),
                    display_name: self.recipient.clone(),
                }],
            },
            sender_address: self.sender.clone(),
        }
    }
}

/// Renders active alerts for one line into an email.
#[derive(Debug, Clone)]
pub struct Formatter {
    line_name: String,
}

impl Formatter {
    pub fn new(line_name: impl Into<String>) -> Self {
        Self {
            line_name: line_name.into(),
        }
    }

    /// Returns `None` when there is nothing to report.
    pub fn format(
        &self,
        alerts: Vec<ActiveAlert>,
        recipient: &str,
        sender: &str,
    ) -> Option<NotificationPayload> {
        self.format_at(alerts, recipient, sender, Local::now())
    }

    pub fn format_at<Tz>(
        &self,
        alerts: Vec<ActiveAlert>,
        recipient: &str,
        sender: &str,
        now: DateTime<Tz>,
    ) -> Option<NotificationPayload>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if alerts.is_empty() {
            return None;
        }

        let subject = format!(
            "{} Train Service Alert - {}",
            self.line_name,
            now.format("%Y-%m-%d %H:%M")
        );

        Some(NotificationPayload {
            subject,
            plain_text: plain_text(&alerts),
            html: self.html(&alerts, &now.format("%Y-%m-%d %H:%M:%S").to_string()),
            alerts,
            recipient: recipient.to_string(),
            sender: sender.to_string(),
        })
    }

    fn html(&self, alerts: &[ActiveAlert], generated_at: &str) -> String {
        let mut html = String::from("<html><body>");
        html.push_str(&format!("<h2>{} Train Service Alerts</h2>", self.line_name));
        html.push_str("<p>The following service changes are currently active:</p>");
        for alert in alerts {
            html.push_str(&format!(
                "<div><p><strong>{}</strong></p><p>{}</p><hr></div>",
                alert.header, alert.active_period
            ));
        }
        html.push_str(&format!("<p><em>Generated at {}</em></p>", generated_at));
        html.push_str("</body></html>");
        html
    }
}

fn plain_text(alerts: &[ActiveAlert]) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    alerts
        .iter()
        .flat_map(|alert| {
            [
                format!("Alert: {}", alert.header),
                format!("Active Period: {}", alert.active_period),
                separator.clone(),
            ]
        })
        .collect::<Vec<_>>()
        .join("\n")
}
