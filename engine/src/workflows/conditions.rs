// Workflow conditions - context assembly and gate evaluation

use serde_json::Value;
use tracing::{debug, warn};

use gatehouse_shared::DomainEvent;

use crate::context::EvaluationContext;
use crate::expression::Evaluator;

/// Context a workflow condition sees.
///
/// `entity`, `entityId`, `user`, `timestamp` and `behavior` come from the
/// event itself; every data field is also spread at the top level so rules
/// can say `priority == 'high'`. The event keys win on collision.
pub fn condition_context(event: &DomainEvent) -> EvaluationContext {
    let user = event
        .user
        .as_ref()
        .and_then(|u| serde_json::to_value(u).ok())
        .unwrap_or(Value::Null);

    EvaluationContext::new()
        .with("entity", event.entity.as_str())
        .with("entityId", event.entity_id.as_str())
        .with("user", user)
        .with("timestamp", event.timestamp.to_rfc3339())
        .with("behavior", event.behavior.clone().map_or(Value::Null, Value::String))
        .with("data", Value::Object(event.data.clone()))
        .with_defaults(&event.data)
}

/// Whether a workflow should run. A missing condition always passes; an
/// expression that fails to evaluate skips the workflow.
pub fn should_run(evaluator: &Evaluator, workflow: &str, condition: Option<&str>, context: &EvaluationContext) -> bool {
    let Some(condition) = condition else {
        return true;
    };

    let result = evaluator.evaluate(condition, context);
    if let Some(error) = &result.error {
        warn!(workflow, condition, error = %error, "Workflow condition failed to evaluate, skipping");
        return false;
    }

    let passed = result.passed();
    if !passed {
        debug!(workflow, condition, "Workflow condition not met");
    }
    passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_shared::UserView;
    use serde_json::json;

    fn event(priority: &str) -> DomainEvent {
        let data = json!({"priority": priority, "entity": "spoofed", "estimate": 5});
        DomainEvent::new("Task", "7", data.as_object().cloned().unwrap())
            .with_behavior("completed")
            .with_user(UserView::new("u1", "u1@example.com"))
    }

    #[test]
    fn test_data_fields_spread_at_top_level() {
        let ctx = condition_context(&event("high"));
        assert_eq!(ctx.get("priority"), Some(&json!("high")));
        assert_eq!(ctx.get("estimate"), Some(&json!(5)));
        assert_eq!(ctx.get("behavior"), Some(&json!("completed")));
        assert_eq!(ctx.get("user").and_then(|u| u.get("id")), Some(&json!("u1")));
    }

    #[test]
    fn test_event_keys_win_over_data_fields() {
        let ctx = condition_context(&event("high"));
        assert_eq!(ctx.get("entity"), Some(&json!("Task")));
        assert_eq!(ctx.get("data").and_then(|d| d.get("entity")), Some(&json!("spoofed")));
    }

    #[test]
    fn test_should_run() {
        let evaluator = Evaluator::new(16);
        let high = condition_context(&event("high"));
        let low = condition_context(&event("low"));

        assert!(should_run(&evaluator, "w", None, &low));
        assert!(should_run(&evaluator, "w", Some("priority == 'high'"), &high));
        assert!(!should_run(&evaluator, "w", Some("priority == 'high'"), &low));
        assert!(!should_run(&evaluator, "w", Some("priority = 'high'"), &high));
        assert!(!should_run(&evaluator, "w", Some("assignee.name"), &high));
    }
}
