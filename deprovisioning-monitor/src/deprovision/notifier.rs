/*!
Report rendering and email delivery of deprovisioned accounts
*/

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

use crate::deprovision::config::EmailConfig;
use crate::deprovision::error::Result;
use crate::deprovision::user::User;

pub const REPORT_FILENAME: &str = "users.json";
const REPORT_CONTENT_TYPE: &str = "application/json";

/// One line of the report sent to the administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountDetails {
    pub id: String,
}

/// Report entries for every user carrying a shared identifier, in discovery order
pub fn build_report(users: &[User]) -> Vec<AccountDetails> {
    users
        .iter()
        .filter_map(|user| user.shared_id.clone())
        .map(|id| AccountDetails { id })
        .collect()
}

/// Render the report as indented JSON with sorted keys so that
/// successive reports diff cleanly.
pub fn render_report(report: &[AccountDetails]) -> Result<String> {
    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(report)?;

    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;

    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub message: String,
}

/// A fully rendered notification ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub intro_text: String,
    pub attachments: Vec<Attachment>,
}

impl Notification {
    pub fn from_config(config: &EmailConfig, attachments: Vec<Attachment>) -> Self {
        Self {
            from: config.from.clone(),
            to: config.to.clone(),
            subject: config.subject.clone(),
            intro_text: config.intro_text.clone(),
            attachments,
        }
    }
}

/// Delivery channel for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// SMTP notifier
pub struct MailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailNotifier {
    /// Configure the SMTP transport. No connection is made until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self { transport: builder.build() })
    }
}

/// Assemble a multipart message: the intro text followed by every attachment
pub fn build_message(notification: &Notification) -> Result<Message> {
    let mut builder = Message::builder()
        .from(notification.from.parse::<Mailbox>()?)
        .subject(notification.subject.clone());
    for recipient in &notification.to {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }

    let content_type = ContentType::parse(REPORT_CONTENT_TYPE)?;
    let mut body =
        MultiPart::mixed().singlepart(SinglePart::plain(notification.intro_text.clone()));
    for attachment in &notification.attachments {
        body = body.singlepart(
            MailAttachment::new(attachment.filename.clone())
                .body(attachment.message.clone(), content_type.clone()),
        );
    }

    Ok(builder.multipart(body)?)
}

#[async_trait]
impl Notifier for MailNotifier {
    fn name(&self) -> &'static str {
        "Email"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = build_message(notification)?;
        debug!("Delivering notification to {:?}", notification.to);
        self.transport.send(message).await?;
        info!("📧 Notification sent to {}", notification.to.join(", "));
        Ok(())
    }
}
