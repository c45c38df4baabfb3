//! Rule-based record permissions.
//!
//! Every entity type owns a [`PermissionRules`] set mapping action names to
//! expressions. A rule passes only when its expression evaluates
//! successfully to a truthy value; parse failures deny. Actions with no rule
//! follow the configured [`MissingRulePolicy`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use gatehouse_shared::{AuthState, EntityView, PermissionRules};

use super::context::build_context;
use crate::context::EvaluationContext;
use crate::expression::{Evaluator, Expression, ExpressionError};

/// Actions every entity is assumed to support.
pub const STANDARD_ACTIONS: [&str; 4] = ["create", "read", "update", "delete"];

/// What an action without a rule means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRulePolicy {
    #[default]
    Allow,
    Deny,
}

impl MissingRulePolicy {
    fn allows(self) -> bool {
        matches!(self, MissingRulePolicy::Allow)
    }
}

impl std::str::FromStr for MissingRulePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown permission default '{other}', expected allow or deny")),
        }
    }
}

/// A rule that failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleIssue {
    pub action: String,
    pub error: ExpressionError,
}

pub struct PermissionEvaluator {
    evaluator: Arc<Evaluator>,
    missing_rule: MissingRulePolicy,
}

impl PermissionEvaluator {
    pub fn new(evaluator: Arc<Evaluator>, missing_rule: MissingRulePolicy) -> Self {
        Self {
            evaluator,
            missing_rule,
        }
    }

    pub fn missing_rule_policy(&self) -> MissingRulePolicy {
        self.missing_rule
    }

    /// Evaluate a single expression as a permission; any failure is `false`.
    pub fn evaluate(&self, expression: &str, context: &EvaluationContext) -> bool {
        let result = self.evaluator.evaluate(expression, context);
        if let Some(error) = &result.error {
            warn!(expression, error = %error, "Permission rule failed to evaluate, denying");
        }
        result.passed()
    }

    /// Decide one `action` against an already-built context.
    fn decide(&self, rules: &PermissionRules, action: &str, context: &EvaluationContext) -> bool {
        match rules.get(action) {
            Some(expression) => self.evaluate(expression, context),
            None => {
                debug!(action, policy = ?self.missing_rule, "No permission rule for action");
                self.missing_rule.allows()
            }
        }
    }

    /// Single-record gate used before a mutation or per returned row.
    pub fn check_permission(
        &self,
        rules: &PermissionRules,
        auth: &AuthState,
        snapshot: Option<&EntityView>,
        action: &str,
    ) -> bool {
        if rules.get(action).is_none() {
            return self.missing_rule.allows();
        }
        let context = build_context(auth, snapshot, action);
        self.decide(rules, action, &context)
    }

    /// Evaluate every rule of `rules` against one context in a single pass.
    pub fn evaluate_multiple(&self, rules: &PermissionRules, context: &EvaluationContext) -> BTreeMap<String, bool> {
        rules
            .iter()
            .map(|(action, expression)| (action.to_string(), self.evaluate(expression, context)))
            .collect()
    }

    /// Actions `auth` may perform on `entity`: the standard CRUD set plus
    /// every action named by a rule, each decided with its own context.
    pub fn allowed_actions(&self, rules: &PermissionRules, auth: &AuthState, entity: Option<&EntityView>) -> Vec<String> {
        let mut candidates: Vec<&str> = STANDARD_ACTIONS.to_vec();
        for action in rules.actions() {
            if !candidates.contains(&action) {
                candidates.push(action);
            }
        }

        candidates
            .into_iter()
            .filter(|action| self.check_permission(rules, auth, entity, action))
            .map(str::to_string)
            .collect()
    }

    /// Keep only the records `auth` may perform `action` on.
    pub fn filter_permitted<'a, I>(
        &self,
        rules: &PermissionRules,
        auth: &AuthState,
        records: I,
        action: &str,
    ) -> Vec<&'a EntityView>
    where
        I: IntoIterator<Item = &'a EntityView>,
    {
        records
            .into_iter()
            .filter(|record| self.check_permission(rules, auth, Some(*record), action))
            .collect()
    }
}

/// Parse every rule up front so misconfiguration surfaces at load time.
pub fn validate_rules(rules: &PermissionRules) -> Vec<RuleIssue> {
    rules
        .iter()
        .filter_map(|(action, expression)| {
            Expression::parse(expression).err().map(|error| RuleIssue {
                action: action.to_string(),
                error,
            })
        })
        .collect()
}
