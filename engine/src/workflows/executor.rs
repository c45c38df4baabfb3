// Workflow executor - runs built-in actions

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use gatehouse_shared::DomainEvent;

use super::actions::{Action, ActionError, ActionResult};
use crate::services::{Mailer, OutgoingEmail, StatsRegistry};

/// Everything an action sees besides its kind.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub trigger: &'a str,
    pub workflow: &'a str,
    pub event: &'a DomainEvent,
    /// Interpolated params; `Null` for tag actions.
    pub params: Value,
}

/// Seam between dispatch and side effects.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: &Action, invocation: &Invocation<'_>) -> ActionResult;
}

/// Host persistence for `{type: "database"}` actions.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, params: &Value, event: &DomainEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default handler for the closed built-in action set.
///
/// Channels that are not configured (no mailer, no Slack URL, no record
/// sink) log a warning and succeed, so a missing integration never aborts
/// the rest of a workflow.
pub struct BuiltinActions {
    http: reqwest::Client,
    timeout: Duration,
    mailer: Option<Arc<dyn Mailer>>,
    sink: Option<Arc<dyn RecordSink>>,
    stats: Arc<StatsRegistry>,
    slack_webhook_url: Option<String>,
    notify_email_to: Option<String>,
}

impl Default for BuiltinActions {
    fn default() -> Self {
        Self::new(DEFAULT_WEBHOOK_TIMEOUT)
    }
}

impl BuiltinActions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
            mailer: None,
            sink: None,
            stats: Arc::new(StatsRegistry::new()),
            slack_webhook_url: None,
            notify_email_to: None,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsRegistry>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_slack_webhook(mut self, url: impl Into<String>) -> Self {
        self.slack_webhook_url = Some(url.into());
        self
    }

    pub fn with_notify_email(mut self, to: impl Into<String>) -> Self {
        self.notify_email_to = Some(to.into());
        self
    }

    pub fn stats(&self) -> Arc<StatsRegistry> {
        Arc::clone(&self.stats)
    }

    fn summary(event: &DomainEvent) -> String {
        match &event.behavior {
            Some(behavior) => format!("{} {} {}", event.entity, event.entity_id, behavior),
            None => format!("{} {}", event.entity, event.entity_id),
        }
    }

    async fn send_http(
        &self,
        method: Method,
        url: &str,
        headers: Option<&serde_json::Map<String, Value>>,
        body: &Value,
    ) -> ActionResult {
        let mut request = self.http.request(method, url).timeout(self.timeout).json(body);
        for (name, value) in headers.into_iter().flatten() {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            request = request.header(name.as_str(), value);
        }

        let response = request.send().await.map_err(|e| ActionError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(url, status = status.as_u16(), "HTTP action delivered");
        Ok(())
    }

    async fn execute_webhook(&self, invocation: &Invocation<'_>) -> ActionResult {
        let params = &invocation.params;
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or(ActionError::MissingParam("url"))?;

        let method = match params.get("method").and_then(Value::as_str) {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| ActionError::InvalidParam {
                param: "method",
                reason: e.to_string(),
            })?,
            None => Method::POST,
        };

        let headers = match params.get("headers") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(ActionError::InvalidParam {
                    param: "headers",
                    reason: "expected an object".to_string(),
                })
            }
        };

        let body = match params.get("body") {
            Some(body) => body.clone(),
            None => json!({
                "trigger": invocation.trigger,
                "workflow": invocation.workflow,
                "event": invocation.event,
            }),
        };

        self.send_http(method, url, headers, &body).await
    }

    async fn execute_slack(&self, invocation: &Invocation<'_>) -> ActionResult {
        let Some(url) = &self.slack_webhook_url else {
            warn!(workflow = invocation.workflow, "Slack webhook URL not configured, skipping notify.slack");
            return Ok(());
        };
        let body = json!({
            "text": format!("[{}] {}", invocation.trigger, Self::summary(invocation.event)),
        });
        self.send_http(Method::POST, url, None, &body).await
    }

    async fn deliver(&self, workflow: &str, email: OutgoingEmail) -> ActionResult {
        let Some(mailer) = &self.mailer else {
            warn!(workflow, "No mailer configured, skipping email action");
            return Ok(());
        };
        mailer.send(&email).await.map_err(|e| ActionError::Mail(e.to_string()))
    }

    async fn execute_notify_email(&self, invocation: &Invocation<'_>) -> ActionResult {
        let Some(to) = &self.notify_email_to else {
            warn!(workflow = invocation.workflow, "No notification recipient configured, skipping notify.email");
            return Ok(());
        };
        let email = OutgoingEmail {
            to: vec![to.clone()],
            subject: format!("[{}] {}", invocation.trigger, Self::summary(invocation.event)),
            body: serde_json::to_string_pretty(&invocation.event.data).unwrap_or_default(),
        };
        self.deliver(invocation.workflow, email).await
    }

    async fn execute_email(&self, invocation: &Invocation<'_>) -> ActionResult {
        let params = &invocation.params;
        let to = match params.get("to") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or(ActionError::InvalidParam {
                        param: "to",
                        reason: "recipients must be strings".to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ActionError::InvalidParam {
                    param: "to",
                    reason: "expected a string or list of strings".to_string(),
                })
            }
            None => return Err(ActionError::MissingParam("to")),
        };
        if to.is_empty() {
            return Err(ActionError::MissingParam("to"));
        }

        let text = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let email = OutgoingEmail {
            to,
            subject: text("subject"),
            body: text("body"),
        };
        self.deliver(invocation.workflow, email).await
    }

    async fn execute_database(&self, invocation: &Invocation<'_>) -> ActionResult {
        let Some(sink) = &self.sink else {
            warn!(workflow = invocation.workflow, "No record sink configured, skipping database action");
            return Ok(());
        };
        sink.write(&invocation.params, invocation.event)
            .await
            .map_err(|e| ActionError::Sink(e.to_string()))
    }
}

#[async_trait]
impl ActionHandler for BuiltinActions {
    async fn execute(&self, action: &Action, invocation: &Invocation<'_>) -> ActionResult {
        match action {
            Action::Log(_) => {
                let note = invocation.params.get("message").and_then(Value::as_str);
                info!(
                    trigger = invocation.trigger,
                    workflow = invocation.workflow,
                    entity = %invocation.event.entity,
                    entity_id = %invocation.event.entity_id,
                    note,
                    "Workflow log"
                );
                Ok(())
            }
            Action::UpdateStats => {
                let count = self.stats.increment(invocation.trigger);
                debug!(trigger = invocation.trigger, count, "Stats updated");
                Ok(())
            }
            Action::NotifyEmail => self.execute_notify_email(invocation).await,
            Action::NotifySlack => self.execute_slack(invocation).await,
            Action::Webhook(_) => self.execute_webhook(invocation).await,
            Action::Email(_) => self.execute_email(invocation).await,
            Action::Database(_) => self.execute_database(invocation).await,
            Action::Unrecognized(raw) => {
                warn!(workflow = invocation.workflow, action = %raw, "Unrecognized action, skipping");
                Ok(())
            }
        }
    }
}
