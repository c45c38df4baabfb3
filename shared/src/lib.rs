use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field -> value snapshot of a single record.
pub type EntityView = Map<String, Value>;

/// Read-only projection of the acting principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_active() -> bool {
    true
}

impl UserView {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            role: default_role(),
            is_active: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Authentication state of the caller as seen by the permission layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub authenticated: bool,
    pub user: Option<UserView>,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: UserView) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
        }
    }
}

/// Immutable record of a committed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub entity: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

impl DomainEvent {
    pub fn new(entity: impl Into<String>, entity_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            entity_id: entity_id.into(),
            behavior: None,
            data,
            timestamp: Utc::now(),
            user: None,
        }
    }

    pub fn with_behavior(mut self, behavior: impl Into<String>) -> Self {
        self.behavior = Some(behavior.into());
        self
    }

    pub fn with_user(mut self, user: UserView) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Conventional trigger name, `<entity>.<behavior>` in lower case.
    pub fn default_trigger(&self) -> Option<String> {
        self.behavior
            .as_ref()
            .map(|behavior| format!("{}.{}", self.entity.to_lowercase(), behavior))
    }
}

/// One entry of a workflow's action list, as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    /// Bare tag naming a built-in, e.g. `"log"`.
    Tag(String),
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        params: Value,
    },
    /// Anything else; kept so the engine can log what it skipped.
    Other(Value),
}

impl ActionSpec {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    pub fn typed(kind: impl Into<String>, params: Value) -> Self {
        Self::Typed {
            kind: kind.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(rename = "async", default)]
    pub is_async: bool,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            condition: None,
            actions: Vec::new(),
            is_async: false,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    pub fn detached(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// Outcome of evaluating one expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// `value` is `None` when the expression resolved to a missing path.
    pub fn success(value: Option<Value>) -> Self {
        Self {
            success: true,
            value,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
        }
    }

    /// True only for a successful evaluation whose value is truthy.
    pub fn passed(&self) -> bool {
        self.success && self.value.as_ref().is_some_and(is_truthy)
    }
}

/// Truthiness used wherever a boolean is required: `false`, `null`, `0`,
/// and `""` are falsy, everything else (including empty arrays and objects)
/// is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Action name -> expression, owned by one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionRules(BTreeMap<String, String>);

impl PermissionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, action: impl Into<String>, expression: impl Into<String>) -> Self {
        self.0.insert(action.into(), expression.into());
        self
    }

    pub fn get(&self, action: &str) -> Option<&str> {
        self.0.get(action).map(String::as_str)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, e)| (a.as_str(), e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<A: Into<String>, E: Into<String>> FromIterator<(A, E)> for PermissionRules {
    fn from_iter<T: IntoIterator<Item = (A, E)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(a, e)| (a.into(), e.into())).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPolicy {
    #[serde(default)]
    pub permissions: PermissionRules,
}

/// Declarative configuration object: per-entity rule sets plus the global
/// workflow list. Replaced wholesale on reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineManifest {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityPolicy>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}
