// Dispatch scenarios: ordering, conditions, detachment, listeners, reload

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatehouse_shared::{ActionSpec, DomainEvent, EngineManifest, EntityPolicy, PermissionRules, WorkflowDefinition};

use crate::tests::fixtures::{gatehouse, task_event};
use crate::workflows::{EventListener, FnListener, ListenerResult, WorkflowOutcome};

fn manifest(workflows: Vec<WorkflowDefinition>) -> EngineManifest {
    EngineManifest {
        workflows,
        ..EngineManifest::default()
    }
}

#[tokio::test]
async fn test_high_priority_condition_scenario() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![WorkflowDefinition::new("escalate", "task.completed")
            .with_condition("priority == 'high'")
            .with_action(ActionSpec::tag("log"))]))
        .await
        .unwrap();

    let report = gatehouse.emit("task.completed", &task_event("completed", "low")).await;
    assert_eq!(report.outcome("escalate"), Some(&WorkflowOutcome::Skipped));
    assert!(actions.calls().is_empty());

    let report = gatehouse.emit("task.completed", &task_event("completed", "high")).await;
    assert_eq!(report.outcome("escalate"), Some(&WorkflowOutcome::Completed { actions_run: 1 }));
    assert_eq!(actions.labels(), vec!["escalate:log"]);
}

#[tokio::test]
async fn test_false_condition_skips_but_sibling_runs() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![
            WorkflowDefinition::new("never", "task.completed")
                .with_condition("false")
                .with_action(ActionSpec::tag("log")),
            WorkflowDefinition::new("broken", "task.completed")
                .with_condition("missing.path.here")
                .with_action(ActionSpec::tag("log")),
            WorkflowDefinition::new("always", "task.completed").with_action(ActionSpec::tag("updateStats")),
        ]))
        .await
        .unwrap();

    let report = gatehouse.emit("task.completed", &task_event("completed", "high")).await;
    assert_eq!(report.outcome("never"), Some(&WorkflowOutcome::Skipped));
    assert_eq!(report.outcome("broken"), Some(&WorkflowOutcome::Skipped));
    assert_eq!(actions.labels(), vec!["always:updateStats"]);
}

#[tokio::test]
async fn test_sync_workflows_run_in_registration_order() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![
            WorkflowDefinition::new("w1", "task.created")
                .with_action(ActionSpec::tag("log"))
                .with_action(ActionSpec::typed("database", json!({"sleep_ms": 25})))
                .with_action(ActionSpec::tag("updateStats")),
            WorkflowDefinition::new("w2", "task.created").with_action(ActionSpec::tag("log")),
        ]))
        .await
        .unwrap();

    gatehouse.emit("task.created", &task_event("created", "low")).await;
    assert_eq!(
        actions.labels(),
        vec!["w1:log", "w1:database", "w1:updateStats", "w2:log"]
    );
}

#[tokio::test]
async fn test_params_are_interpolated_from_event() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![WorkflowDefinition::new("mail", "task.completed").with_action(
            ActionSpec::typed(
                "email",
                json!({
                    "to": "${user.email}",
                    "subject": "${entityType} ${entityId} ${actionType} (${data.priority})",
                    "body": "${data.unknown}"
                }),
            ),
        )]))
        .await
        .unwrap();

    gatehouse.emit("task.completed", &task_event("completed", "high")).await;
    let calls = actions.calls();
    assert_eq!(calls[0].kind, "email");
    assert_eq!(
        calls[0].params,
        json!({
            "to": "u1@example.com",
            "subject": "Task 1 completed (high)",
            "body": "${data.unknown}"
        })
    );
}

#[tokio::test]
async fn test_fire_and_forget_isolation() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![
            WorkflowDefinition::new("background", "task.created")
                .with_action(ActionSpec::typed("database", json!({"sleep_ms": 50})))
                .with_action(ActionSpec::typed("webhook", json!({"url": "http://fixture"})))
                .with_action(ActionSpec::tag("log"))
                .detached(),
            WorkflowDefinition::new("foreground", "task.created").with_action(ActionSpec::tag("log")),
        ]))
        .await
        .unwrap();

    let report = gatehouse.emit("task.created", &task_event("created", "low")).await;
    assert_eq!(report.outcome("background"), Some(&WorkflowOutcome::Detached));
    assert_eq!(report.outcome("foreground"), Some(&WorkflowOutcome::Completed { actions_run: 1 }));
    assert_eq!(actions.labels(), vec!["foreground:log"]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    // The detached webhook failure stopped its own list and nothing else.
    assert_eq!(
        actions.labels(),
        vec!["foreground:log", "background:database", "background:webhook"]
    );
}

#[tokio::test]
async fn test_async_workflow_failing_first_action() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![
            WorkflowDefinition::new("background", "task.created")
                .with_action(ActionSpec::typed("webhook", json!({"url": "http://fixture"})))
                .with_action(ActionSpec::tag("log"))
                .detached(),
            WorkflowDefinition::new("foreground", "task.created")
                .with_action(ActionSpec::tag("log"))
                .with_action(ActionSpec::tag("updateStats")),
        ]))
        .await
        .unwrap();

    let report = gatehouse.emit("task.created", &task_event("created", "low")).await;
    assert!(report.is_clean());
    assert_eq!(report.outcome("background"), Some(&WorkflowOutcome::Detached));
    assert_eq!(report.outcome("foreground"), Some(&WorkflowOutcome::Completed { actions_run: 2 }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let labels = actions.labels();
    assert!(labels.contains(&"background:webhook".to_string()));
    assert!(!labels.contains(&"background:log".to_string()));
    assert!(labels.contains(&"foreground:log".to_string()));
    assert!(labels.contains(&"foreground:updateStats".to_string()));
}

#[tokio::test]
async fn test_emit_detached_returns_immediately() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![WorkflowDefinition::new("slow", "task.created")
            .with_action(ActionSpec::typed("database", json!({"sleep_ms": 30})))]))
        .await
        .unwrap();

    gatehouse.emit_detached("task.created", task_event("created", "low"));
    assert!(actions.calls().is_empty());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(actions.labels(), vec!["slow:database"]);
}

struct Exploding;

#[async_trait]
impl EventListener for Exploding {
    async fn on_event(&self, _trigger: &str, _event: &DomainEvent) -> ListenerResult {
        panic!("listener exploded")
    }
}

#[tokio::test]
async fn test_listener_failures_are_swallowed() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![
            WorkflowDefinition::new("after", "task.deleted").with_action(ActionSpec::tag("log")),
        ]))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failing = FnListener::new(|_trigger, _event| async { Err("listener refused".into()) });
    let recording = {
        let seen = Arc::clone(&seen);
        FnListener::new(move |trigger, event: DomainEvent| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(format!("{trigger}:{}", event.entity_id));
                Ok(())
            }
        })
    };
    gatehouse.on("task.deleted", Arc::new(failing)).await;
    gatehouse.on("task.deleted", Arc::new(Exploding)).await;
    gatehouse.on("task.deleted", Arc::new(recording)).await;

    let report = gatehouse.emit("task.deleted", &task_event("deleted", "low")).await;
    assert_eq!(report.listener_failures, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["task.deleted:1"]);
    assert_eq!(actions.labels(), vec!["after:log"]);
}

#[tokio::test]
async fn test_in_flight_dispatch_keeps_its_snapshot() {
    let (gatehouse, actions) = gatehouse();
    gatehouse
        .apply_manifest(manifest(vec![WorkflowDefinition::new("v1", "task.created")
            .with_action(ActionSpec::typed("database", json!({"sleep_ms": 40})))
            .with_action(ActionSpec::tag("log"))]))
        .await
        .unwrap();

    let in_flight = {
        let gatehouse = gatehouse.clone();
        tokio::spawn(async move { gatehouse.emit("task.created", &task_event("created", "low")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    gatehouse.apply_manifest(manifest(Vec::new())).await.unwrap();

    let report = in_flight.await.unwrap();
    assert_eq!(report.version, 1);
    assert_eq!(report.outcome("v1"), Some(&WorkflowOutcome::Completed { actions_run: 2 }));

    let after = gatehouse.emit("task.created", &task_event("created", "low")).await;
    assert_eq!(after.version, 2);
    assert!(after.workflows.is_empty());
    assert_eq!(actions.labels(), vec!["v1:database", "v1:log"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_applies_never_mix_manifests() {
    let (gatehouse, _) = gatehouse();

    for _round in 0..25 {
        let applies: Vec<_> = (0..8)
            .map(|i| {
                let gatehouse = gatehouse.clone();
                let tag = format!("m{i}");
                let mut manifest = manifest(vec![
                    WorkflowDefinition::new(tag.clone(), "task.created").with_action(ActionSpec::tag("log")),
                ]);
                manifest.entities.insert(
                    "Task".to_string(),
                    EntityPolicy {
                        permissions: PermissionRules::new().with_rule("read", format!("'{tag}' == '{tag}'")),
                    },
                );
                tokio::spawn(async move { gatehouse.apply_manifest(manifest).await })
            })
            .collect();
        for apply in applies {
            apply.await.unwrap().unwrap();
        }

        let report = gatehouse.emit("task.created", &task_event("created", "low")).await;
        assert_eq!(report.workflows.len(), 1);
        let winner = &report.workflows[0].name;
        let rules = gatehouse.rules("Task").await;
        assert_eq!(rules.get("read"), Some(format!("'{winner}' == '{winner}'").as_str()));
        assert_eq!(report.version, gatehouse.version().await);
    }
}
