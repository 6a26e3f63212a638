use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{MailConfig, MailMode};
use crate::outbox::Email;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The row can never be delivered as stored.
    #[error("malformed email: {0}")]
    Malformed(String),

    /// The transport refused or failed; the row stays pending.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Anything that can hand a built message to a mail system.
///
/// `send` returns `Ok` only once the message has been acknowledged.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), DeliveryError>;

    fn name(&self) -> &'static str;
}

pub fn build_message(email: &Email) -> Result<Message, DeliveryError> {
    if email.email_to.is_empty() {
        return Err(DeliveryError::Malformed("email has no recipients".into()));
    }

    let mut builder = Message::builder()
        .from(mailbox(&email.email_from)?)
        .subject(email.email_subject.clone());
    for addr in &email.email_to {
        builder = builder.to(mailbox(addr)?);
    }
    for addr in &email.email_cc {
        builder = builder.cc(mailbox(addr)?);
    }
    for addr in &email.email_bcc {
        builder = builder.bcc(mailbox(addr)?);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            email.email_text_body.clone(),
            email.email_html_body.clone(),
        ))
        .map_err(|e| DeliveryError::Malformed(e.to_string()))
}

fn mailbox(addr: &str) -> Result<Mailbox, DeliveryError> {
    addr.parse::<Mailbox>()
        .map_err(|e| DeliveryError::Malformed(format!("bad address {addr:?}: {e}")))
}

pub struct SmtpMailTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Self> {
        let inner = if cfg.smtp_tls {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)?
                .port(cfg.smtp_port);
            if let (Some(user), Some(password)) = (&cfg.smtp_user, &cfg.smtp_password) {
                builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
            }
            builder.build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
                .port(cfg.smtp_port)
                .build()
        };
        Ok(Self { inner })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        let response = self
            .inner
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(DeliveryError::Transport(format!(
                "smtp replied {}",
                response.code()
            )))
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Acknowledges every message after logging it. For local runs without a relay.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        let envelope = message.envelope();
        tracing::info!(
            from = ?envelope.from().map(|a| a.to_string()),
            to = ?envelope.to().iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            "email delivered to log transport"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub fn transport_from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn MailTransport>> {
    Ok(match cfg.mode {
        MailMode::Smtp => std::sync::Arc::new(SmtpMailTransport::from_config(cfg)?),
        MailMode::Log => std::sync::Arc::new(LogMailTransport),
    })
}
