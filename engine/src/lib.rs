//! Gatehouse: record-level permissions and reactive workflows.
//!
//! - [`expression`]: the restricted rule/condition language
//! - [`auth`]: per-action permission rules with ownership shortcuts
//! - [`template`]: `${path}` interpolation of action params
//! - [`workflows`]: trigger dispatch to listeners and declarative workflows
//! - [`runtime`]: the [`Gatehouse`] facade tying them to a manifest

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod manifest;
pub mod path;
pub mod runtime;
pub mod services;
pub mod telemetry;
pub mod template;
pub mod workflows;

#[cfg(test)]
mod tests;

pub use gatehouse_shared as shared;

pub use auth::{MissingRulePolicy, PermissionEvaluator};
pub use config::{EngineConfig, SmtpConfig};
pub use context::EvaluationContext;
pub use error::{EngineError, EngineResult};
pub use expression::{evaluate, Evaluator, Expression, ExpressionError};
pub use runtime::Gatehouse;
pub use template::{interpolate, interpolate_value, SafeContext};
pub use workflows::{DispatchReport, WorkflowEngine, WorkflowOutcome};
