//! Evaluation context assembly for permission rules.

use serde_json::{json, Value};

use gatehouse_shared::{AuthState, EntityView};

use crate::context::EvaluationContext;

/// Relationship fields that feed the ownership shortcuts.
pub mod fields {
    pub const CREATED_BY: &str = "createdBy";
    pub const USER_ID: &str = "userId";
    pub const ASSIGNED_TO: &str = "assignedTo";
}

/// Compare an entity field with the principal id. Ids may be stored as
/// strings or numbers, so both sides compare through their string form.
fn same_id(field: Option<&Value>, user_id: Option<&str>) -> bool {
    match (field, user_id) {
        (Some(Value::String(s)), Some(id)) => s == id,
        (Some(Value::Number(n)), Some(id)) => n.to_string() == id,
        _ => false,
    }
}

/// Build the context a rule sees for `action` on `snapshot`.
///
/// Keys: `authenticated`, `action`, `user`, `entity`, `userId`, `role`,
/// `isAdmin`, `owner`, `isOwner`, `isEntityUser`, `isAssignee`. With no
/// snapshot (collection scope) every shortcut is `false`/`null`.
pub fn build_context(auth: &AuthState, snapshot: Option<&EntityView>, action: &str) -> EvaluationContext {
    let user = auth.user.as_ref();
    let user_id = user.map(|u| u.id.as_str());
    let role = user.map(|u| u.role.as_str());

    let user_value = match user {
        Some(u) => json!({
            "id": u.id,
            "email": u.email,
            "name": u.name,
            "role": u.role,
            "isActive": u.is_active,
        }),
        None => Value::Null,
    };

    let field = |name: &str| snapshot.and_then(|entity| entity.get(name));
    let owner = field(fields::CREATED_BY).cloned().unwrap_or(Value::Null);

    EvaluationContext::new()
        .with("authenticated", auth.authenticated && user.is_some())
        .with("action", action)
        .with("user", user_value)
        .with("entity", snapshot.map_or(Value::Null, |e| Value::Object(e.clone())))
        .with("userId", user_id.map_or(Value::Null, Value::from))
        .with("role", role.map_or(Value::Null, Value::from))
        .with("isAdmin", role == Some("admin"))
        .with("owner", owner)
        .with("isOwner", same_id(field(fields::CREATED_BY), user_id))
        .with("isEntityUser", same_id(field(fields::USER_ID), user_id))
        .with("isAssignee", same_id(field(fields::ASSIGNED_TO), user_id))
}
