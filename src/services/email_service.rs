// ==================== OUTBOUND EMAIL ====================
// Verification emails go out over SMTP. Without SMTP settings the link is
// only logged, which keeps local development usable.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{config::SmtpConfig, utils::error::AppError};

const VERIFICATION_TEMPLATE: &str = include_str!("../../templates/verification_email.html");
pub const VERIFICATION_SUBJECT: &str = "Please verify your email address";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Invalid SMTP relay {}: {}", config.host, e)))?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| AppError::EmailError(format!("Invalid sender: {}", e)))?)
            .to(email.to.parse().map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("SMTP send failed: {}", e)))?;

        log::info!("📧 Email sent to {}", email.to);
        Ok(())
    }
}

/// Used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError> {
        log::warn!(
            "📧 SMTP not configured - email to {} ({}) not sent:\n{}",
            email.to,
            email.subject,
            email.html
        );
        Ok(())
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn verification_email(to: &str, first_name: &str, link: &str, ttl_hours: i64) -> OutgoingEmail {
    let html = VERIFICATION_TEMPLATE
        .replace("{firstName}", &escape_html(first_name))
        .replace("{verificationLink}", &escape_html(link))
        .replace("{ttlHours}", &ttl_hours.to_string())
        .replace("{year}", &chrono::Utc::now().format("%Y").to_string());

    OutgoingEmail {
        to: to.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html,
    }
}
