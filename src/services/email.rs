//! Outgoing mail
//!
//! Services send plain-text messages through the [`Mailer`] trait.
//! [`SmtpMailer`] delivers with lettre; [`RecordingMailer`] keeps messages
//! in memory for tests and can be told to fail.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::SmtpConfig;

/// A plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    /// Message to a single recipient
    pub fn to(address: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![address.into()],
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Address used in `From`, and in `To` for BCC batches
    fn from_address(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Build the SMTP mailer, or `None` when SMTP is not configured
pub fn create_mailer(config: Option<&SmtpConfig>) -> Result<Option<Arc<dyn Mailer>>> {
    match config {
        Some(smtp) if !smtp.host.trim().is_empty() => {
            let mailer = SmtpMailer::new(smtp)?;
            tracing::info!("SMTP mailer configured for {}:{}", smtp.host, smtp.port);
            Ok(Some(Arc::new(mailer)))
        }
        _ => {
            tracing::info!("SMTP not configured; outgoing email disabled");
            Ok(None)
        }
    }
}

/// lettre SMTP transport with STARTTLS relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            from_address: config.from_address.clone(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN);

        for to in &email.to {
            builder = builder.to(to
                .parse()
                .map_err(|e| anyhow!("Invalid to address {}: {}", to, e))?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(bcc
                .parse()
                .map_err(|e| anyhow!("Invalid bcc address {}: {}", bcc, e))?);
        }

        builder
            .body(email.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn from_address(&self) -> &str {
        &self.from_address
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// In-memory mailer for tests
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    /// Number of upcoming sends that should fail
    failures: AtomicUsize,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn from_address(&self) -> &str {
        "noreply@quillpress.test"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(anyhow!("Simulated delivery failure"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("Mailer lock poisoned"))?
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "secret".to_string(),
            from_address: "blog@example.com".to_string(),
            from_name: "Example Blog".to_string(),
        }
    }

    #[test]
    fn test_create_mailer_requires_host() {
        assert!(create_mailer(None).unwrap().is_none());

        let mut config = smtp_config();
        config.host = "  ".to_string();
        assert!(create_mailer(Some(&config)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_smtp_message_has_bcc_recipients() {
        let mailer = SmtpMailer::new(&smtp_config()).unwrap();
        let email = OutgoingEmail {
            to: vec!["blog@example.com".to_string()],
            bcc: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "New Post: Hello".to_string(),
            body: "body".to_string(),
        };

        let message = mailer.build_message(&email).unwrap();
        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 3);
        assert_eq!(mailer.from_address(), "blog@example.com");

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: New Post: Hello"));
        assert!(!formatted.contains("a@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_address_is_error() {
        let mailer = SmtpMailer::new(&smtp_config()).unwrap();
        let email = OutgoingEmail::to("not an address", "s", "b");
        assert!(mailer.build_message(&email).is_err());
    }

    #[tokio::test]
    async fn test_recording_mailer_failures() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(1);

        let email = OutgoingEmail::to("a@example.com", "Hi", "Body");
        assert!(mailer.send(&email).await.is_err());
        mailer.send(&email).await.unwrap();

        assert_eq!(mailer.sent(), vec![email]);
        mailer.clear();
        assert!(mailer.sent().is_empty());
    }
}
