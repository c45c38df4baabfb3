//! Crate-level errors for manifest loading and runtime construction.
//!
//! Evaluation never errors through here: expressions report through
//! `EvaluationResult`, permissions through `false`, and workflow failures
//! through the dispatch report.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    /// Field-level problems keyed by location, e.g. `entities.Task.permissions.update`.
    #[error("manifest failed validation")]
    Validation { details: BTreeMap<String, Vec<String>> },
    #[error("mail transport: {0}")]
    Mailer(String),
}

impl EngineError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "MANIFEST_PARSE_ERROR",
            Self::Io(_) => "MANIFEST_IO_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Mailer(_) => "MAILER_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Validation { details } => {
                let count: usize = details.values().map(Vec::len).sum();
                format!("Manifest failed validation with {count} issue(s)")
            }
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::Validation { details } => Some(details),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Collects field-level validation errors
#[derive(Debug, Default)]
pub struct ValidationBuilder {
    details: BTreeMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.details.entry(field.into()).or_default().push(message.into());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }

    pub fn finish(self) -> EngineResult<()> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation { details: self.details })
        }
    }
}
