use std::time::Duration;

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, instrument};

use crate::config::EmailConfig;
use crate::error::NotifyError;
use crate::models::{ManuscriptStatus, StatusField};

const SMTP_TIMEOUT: Duration = Duration::from_secs(25);

/// A rendered message, ready to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Delivery channel for notifications
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Why a notification is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Baseline,
    Changed,
}

impl NotificationKind {
    fn headline(&self) -> &'static str {
        match self {
            NotificationKind::Baseline => "Baseline captured",
            NotificationKind::Changed => "Status changed",
        }
    }
}

/// Renders notifications for one tracked paper
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pub label: String,
    pub subject_prefix: String,
}

impl MessageTemplate {
    pub fn new(label: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Render a message for `current`, compared against `prior` when there is one
    pub fn render(
        &self,
        kind: NotificationKind,
        prior: Option<&ManuscriptStatus>,
        current: &ManuscriptStatus,
    ) -> Notification {
        let progress = match current.progress_status.trim() {
            "" => "Unknown",
            p => p,
        };

        Notification {
            subject: format!("{} {} · {}", self.subject_prefix, progress, self.label),
            text: self.render_text(kind, prior, current),
            html: self.render_html(kind, prior, current),
        }
    }

    fn render_text(
        &self,
        kind: NotificationKind,
        prior: Option<&ManuscriptStatus>,
        current: &ManuscriptStatus,
    ) -> String {
        let mut out = format!("Manuscript status update: {}\n{}\n\n", self.label, kind.headline());

        for row in rows(prior, current) {
            if row.changed {
                out.push_str(&format!(
                    "* {}: {} -> {}\n",
                    row.field.label(),
                    row.before,
                    row.current
                ));
            } else {
                out.push_str(&format!("  {}: {}\n", row.field.label(), row.current));
            }
        }

        if prior.is_some() {
            out.push_str("\nFields marked with * changed since the previous check.\n");
        }

        out
    }

    fn render_html(
        &self,
        kind: NotificationKind,
        prior: Option<&ManuscriptStatus>,
        current: &ManuscriptStatus,
    ) -> String {
        let mut body = String::new();
        for row in rows(prior, current) {
            let style = if row.changed { "background:#fff3cd;" } else { "" };
            body.push_str(&format!(
                "<tr style='{}'>\
                 <td style='padding:8px;font-weight:600;white-space:nowrap;'>{}</td>\
                 <td style='padding:8px;'>{}</td>\
                 <td style='padding:8px;'>{}</td>\
                 </tr>",
                style,
                escape_html(row.field.label()),
                escape_html(&row.before),
                escape_html(&row.current)
            ));
        }

        format!(
            r#"<html>
  <body style="font-family:Arial,Helvetica,sans-serif;line-height:1.5;">
    <h2 style="margin:0 0 10px 0;">Manuscript status update</h2>
    <div style="margin:0 0 4px 0;"><b>Paper:</b> {label}</div>
    <div style="margin:0 0 14px 0;"><b>Event:</b> {headline}</div>
    <table border="1" cellspacing="0" cellpadding="0" style="border-collapse:collapse;min-width:720px;">
      <thead>
        <tr style="background:#f0f0f0;">
          <th style="padding:8px;">Field</th>
          <th style="padding:8px;">Before</th>
          <th style="padding:8px;">Current</th>
        </tr>
      </thead>
      <tbody>
        {body}
      </tbody>
    </table>
    <div style="margin-top:12px;color:#666;font-size:12px;">
      Highlighted rows changed since the previous check.
    </div>
  </body>
</html>
"#,
            label = escape_html(&self.label),
            headline = kind.headline(),
            body = body,
        )
    }
}

struct Row {
    field: StatusField,
    before: String,
    current: String,
    changed: bool,
}

fn rows(prior: Option<&ManuscriptStatus>, current: &ManuscriptStatus) -> Vec<Row> {
    StatusField::ALL
        .iter()
        .map(|field| {
            let now = current.value(*field);
            let before = prior.map(|p| p.value(*field));
            Row {
                field: *field,
                changed: before.as_ref().is_some_and(|b| *b != now),
                before: before.filter(|b| !b.is_empty()).unwrap_or_else(|| "-".to_string()),
                current: if now.is_empty() { "-".to_string() } else { now },
            }
        })
        .collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// SMTP notifier
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, password: &str) -> Result<Self, NotifyError> {
        let from = parse_mailbox(config.from_address())?;
        let to = config
            .to
            .to_vec()
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() {
            return Err(NotifyError::Message("no recipients configured".to_string()));
        }

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        info!(
            host = %config.host,
            port = config.port,
            recipients = to.len(),
            "Initialized email notifier"
        );

        Ok(Self { transport, from, to })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl Notifier for EmailNotifier {
    #[instrument(skip(self, notification), fields(subject = %notification.subject))]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone());

        for to in &self.to {
            builder = builder.to(to.clone());
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                notification.text.clone(),
                notification.html.clone(),
            ))
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        debug!("Sending email notification");

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!("Email notification sent");
        Ok(())
    }
}
