//! Delivery of the finalized summary over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::EmailConfig;
use crate::{require_env, ResearchError, SecretValue};

/// Outbound message handed to the transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport seam. Tests substitute a recording mock; production uses
/// [`SmtpMailer`]. Delivery is attempted once; failures are not retried.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), ResearchError>;
}

/// SMTP mailer using a STARTTLS relay with credential login.
#[derive(Debug)]
pub struct SmtpMailer {
    server: String,
    port: u16,
    username: SecretValue,
    password: SecretValue,
}

impl SmtpMailer {
    /// Credentials come from the environment variables named in config,
    /// never from the config file itself.
    pub fn from_config(config: &EmailConfig) -> Result<Self, ResearchError> {
        Ok(Self {
            server: config.smtp_server.clone(),
            port: config.smtp_port,
            username: require_env(&config.username_env)?,
            password: require_env(&config.password_env)?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ResearchError> {
        let email = Message::builder()
            .from(self
                .username
                .expose()
                .parse()
                .map_err(|err| ResearchError::DeliveryFailed(format!("bad sender address: {err}")))?)
            .to(message
                .to
                .parse()
                .map_err(|err| ResearchError::DeliveryFailed(format!("bad recipient address: {err}")))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|err| ResearchError::DeliveryFailed(err.to_string()))?;

        let credentials = Credentials::new(
            self.username.expose().to_string(),
            self.password.expose().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)
            .map_err(|err| ResearchError::DeliveryFailed(err.to_string()))?
            .port(self.port)
            .credentials(credentials)
            .build();

        transport
            .send(email)
            .await
            .map_err(|err| ResearchError::DeliveryFailed(err.to_string()))?;

        info!(to = %message.to, subject = %message.subject, "summary delivered");
        Ok(())
    }
}
