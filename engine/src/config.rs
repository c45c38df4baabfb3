use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::auth::MissingRulePolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Decision for actions that have no permission rule.
    pub permission_default: MissingRulePolicy,
    /// Parsed-expression cache entries; 0 disables caching.
    pub expression_cache_size: usize,
    pub webhook_timeout: Duration,
    pub slack_webhook_url: Option<String>,
    /// Recipient of `notify.email`.
    pub notify_email_to: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

/// SMTP configuration for the email actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            permission_default: MissingRulePolicy::Allow,
            expression_cache_size: 1024,
            webhook_timeout: Duration::from_secs(10),
            slack_webhook_url: None,
            notify_email_to: None,
            smtp: None,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl EngineConfig {
    /// Read configuration from the environment, loading `.env` first if
    /// present. Only an unknown `PERMISSION_DEFAULT` is an error; malformed
    /// numbers fall back to their defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let permission_default = env::var("PERMISSION_DEFAULT")
            .unwrap_or_else(|_| "allow".to_string())
            .parse::<MissingRulePolicy>()
            .map_err(anyhow::Error::msg)
            .context("PERMISSION_DEFAULT")?;

        // Parse SMTP config only if SMTP_HOST is set
        let smtp = optional("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            username: env::var("SMTP_USERNAME").unwrap_or_default(),
            password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "noreply@localhost".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Gatehouse".to_string()),
            use_tls: env::var("SMTP_USE_TLS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        });

        Ok(EngineConfig {
            permission_default,
            expression_cache_size: env::var("EXPRESSION_CACHE_SIZE")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
            webhook_timeout: Duration::from_secs(
                env::var("WEBHOOK_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            ),
            slack_webhook_url: optional("SLACK_WEBHOOK_URL"),
            notify_email_to: optional("NOTIFY_EMAIL_TO"),
            smtp,
        })
    }
}

impl SmtpConfig {
    /// Check if SMTP is properly configured
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}
