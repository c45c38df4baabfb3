// Permission scenarios through the Gatehouse facade

use std::sync::Arc;

use gatehouse_shared::{AuthState, EngineManifest, EntityPolicy, PermissionRules};

use crate::auth::MissingRulePolicy;
use crate::config::EngineConfig;
use crate::runtime::Gatehouse;
use serde_json::json;

use crate::tests::fixtures::{admin, gatehouse, object, task, user, RecordingActions};

fn task_manifest() -> EngineManifest {
    let mut manifest = EngineManifest::default();
    manifest.entities.insert(
        "Task".to_string(),
        EntityPolicy {
            permissions: PermissionRules::new()
                .with_rule("read", "authenticated")
                .with_rule("update", "user.id == entity.createdBy")
                .with_rule("delete", "isAdmin || (isOwner && entity.priority != 'high')"),
        },
    );
    manifest
}

#[tokio::test]
async fn test_owner_update_scenario() {
    let (gatehouse, _) = gatehouse();
    gatehouse.apply_manifest(task_manifest()).await.unwrap();
    let record = task("1", "u1", "high");

    assert!(!gatehouse.check("Task", &user("u2"), Some(&record), "update").await);
    assert!(gatehouse.check("Task", &user("u1"), Some(&record), "update").await);
}

#[tokio::test]
async fn test_unknown_entity_and_action_default_allow() {
    let (gatehouse, _) = gatehouse();
    gatehouse.apply_manifest(task_manifest()).await.unwrap();

    assert!(gatehouse.check("Invoice", &AuthState::anonymous(), None, "delete").await);
    assert!(gatehouse.check("Task", &AuthState::anonymous(), None, "create").await);
    assert!(!gatehouse.check("Task", &AuthState::anonymous(), None, "read").await);
}

#[tokio::test]
async fn test_deny_policy_from_config() {
    let config = EngineConfig {
        permission_default: MissingRulePolicy::Deny,
        ..EngineConfig::default()
    };
    let gatehouse = Gatehouse::new(&config, Arc::new(RecordingActions::default()));
    gatehouse.apply_manifest(task_manifest()).await.unwrap();

    assert!(!gatehouse.check("Task", &user("u1"), None, "create").await);
    assert!(gatehouse.check("Task", &user("u1"), None, "read").await);
}

#[tokio::test]
async fn test_anonymous_never_matches_missing_owner() {
    let (gatehouse, _) = gatehouse();
    gatehouse.apply_manifest(task_manifest()).await.unwrap();
    let unowned = object(json!({"id": "9"}));
    let anonymous = AuthState::anonymous();

    assert!(!gatehouse.check("Task", &anonymous, Some(&unowned), "update").await);
    assert!(!gatehouse.check("Task", &anonymous, None, "update").await);
    assert!(!gatehouse.check("Task", &user("u1"), Some(&unowned), "update").await);
    assert!(!gatehouse.check("Task", &anonymous, Some(&unowned), "delete").await);
}

#[tokio::test]
async fn test_filter_list_per_record() {
    let (gatehouse, _) = gatehouse();
    gatehouse.apply_manifest(task_manifest()).await.unwrap();
    let records = vec![task("1", "u1", "high"), task("2", "u2", "low"), task("3", "u1", "low")];

    let editable = gatehouse.filter("Task", &user("u1"), &records, "update").await;
    let ids: Vec<&str> = editable.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);

    let deletable = gatehouse.filter("Task", &user("u1"), &records, "delete").await;
    assert_eq!(deletable.len(), 1);
    assert_eq!(gatehouse.filter("Task", &admin("root"), &records, "delete").await.len(), 3);
}

#[tokio::test]
async fn test_allowed_actions() {
    let (gatehouse, _) = gatehouse();
    gatehouse.apply_manifest(task_manifest()).await.unwrap();
    let record = task("3", "u1", "low");

    assert_eq!(
        gatehouse.allowed_actions("Task", &user("u1"), Some(&record)).await,
        vec!["create", "read", "update", "delete"]
    );
    assert_eq!(
        gatehouse.allowed_actions("Task", &user("u2"), Some(&record)).await,
        vec!["create", "read"]
    );
}

#[tokio::test]
async fn test_rejected_manifest_keeps_previous_rules() {
    let (gatehouse, _) = gatehouse();
    assert_eq!(gatehouse.apply_manifest(task_manifest()).await.unwrap(), 1);

    let mut broken = task_manifest();
    broken.entities.insert(
        "Task".to_string(),
        EntityPolicy {
            permissions: PermissionRules::new().with_rule("update", "user.id = entity.createdBy"),
        },
    );
    let err = gatehouse.apply_manifest(broken).await.unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    let rules = gatehouse.rules("Task").await;
    assert_eq!(rules.get("update"), Some("user.id == entity.createdBy"));
    assert_eq!(gatehouse.workflows().version().await, 1);
}
