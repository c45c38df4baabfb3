use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmtpConfig;

pub type MailResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery seam for the email actions.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> MailResult;
}

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());

        let builder = if smtp.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };

        let transport = builder
            .port(smtp.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from = format!("{} <{}>", smtp.from_name, smtp.from_email).parse::<Mailbox>()?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> MailResult {
        let mut builder = Message::builder().from(self.from.clone()).subject(&email.subject);
        for recipient in &email.to {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }
        let message = builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(recipients = email.to.len(), subject = %email.subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, subject = %email.subject, "Failed to send email");
                Err(Box::new(e))
            }
        }
    }
}
