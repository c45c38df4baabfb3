//! Record-level authorization.
//!
//! - `context`: builds the evaluation context a rule sees (principal, record
//!   snapshot, action, ownership shortcuts)
//! - `permissions`: decides allow/deny per action, fail-closed on bad rules

pub mod context;
pub mod permissions;

pub use context::build_context;
pub use permissions::{validate_rules, MissingRulePolicy, PermissionEvaluator, RuleIssue, STANDARD_ACTIONS};
