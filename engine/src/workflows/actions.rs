// Workflow actions - the closed set of built-in action kinds

use serde_json::{json, Value};
use thiserror::Error;

use gatehouse_shared::ActionSpec;

/// A declared action, resolved once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    NotifyEmail,
    NotifySlack,
    /// Optional params carry a `message`.
    Log(Value),
    UpdateStats,
    Webhook(Value),
    Database(Value),
    Email(Value),
    /// Unknown tag or type, kept raw so dispatch can log what it skipped.
    Unrecognized(Value),
}

impl Action {
    pub fn from_spec(spec: &ActionSpec) -> Self {
        match spec {
            ActionSpec::Tag(tag) => Self::from_tag(tag).unwrap_or_else(|| Self::Unrecognized(Value::String(tag.clone()))),
            ActionSpec::Typed { kind, params } => match kind.as_str() {
                "webhook" => Self::Webhook(params.clone()),
                "database" => Self::Database(params.clone()),
                "email" => Self::Email(params.clone()),
                "log" => Self::Log(params.clone()),
                other => Self::from_tag(other).unwrap_or_else(|| {
                    Self::Unrecognized(json!({"type": kind, "params": params}))
                }),
            },
            ActionSpec::Other(raw) => Self::Unrecognized(raw.clone()),
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "notify.email" => Some(Self::NotifyEmail),
            "notify.slack" => Some(Self::NotifySlack),
            "log" => Some(Self::Log(Value::Null)),
            "updateStats" => Some(Self::UpdateStats),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotifyEmail => "notify.email",
            Self::NotifySlack => "notify.slack",
            Self::Log(_) => "log",
            Self::UpdateStats => "updateStats",
            Self::Webhook(_) => "webhook",
            Self::Database(_) => "database",
            Self::Email(_) => "email",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    /// Declared params, subject to interpolation. Tag actions have none.
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Webhook(p) | Self::Database(p) | Self::Email(p) => Some(p),
            Self::Log(p) if !p.is_null() => Some(p),
            _ => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("missing required param '{0}'")]
    MissingParam(&'static str),
    #[error("invalid param '{param}': {reason}")]
    InvalidParam { param: &'static str, reason: String },
    #[error("{url} responded with status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("record sink failed: {0}")]
    Sink(String),
    #[error("action panicked: {0}")]
    Panicked(String),
}

pub type ActionResult = Result<(), ActionError>;
