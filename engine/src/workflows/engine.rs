// Workflow engine - trigger dispatch over an atomically swapped index

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use gatehouse_shared::{DomainEvent, WorkflowDefinition};

use super::actions::{Action, ActionError};
use super::conditions::{condition_context, should_run};
use super::executor::{ActionHandler, Invocation};
use super::triggers::{CompiledWorkflow, EventListener, ListenerRegistry, WorkflowIndex};
use crate::expression::{Evaluator, Expression, ExpressionError};
use crate::template::{validate_value, SafeContext, TemplateIssue};

fn install(current: &mut Arc<WorkflowIndex>, version: u64, workflows: Vec<WorkflowDefinition>) {
    let next = WorkflowIndex::build(version, workflows);
    info!(
        version,
        workflows = next.len(),
        triggers = next.trigger_count(),
        "Loaded workflow index"
    );
    *current = Arc::new(next);
}

/// How a matched workflow ended within one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// Condition was falsy or failed to evaluate.
    Skipped,
    Completed { actions_run: usize },
    /// An action failed; the remaining actions of this workflow did not run.
    Failed { actions_run: usize, error: String },
    /// Started without being awaited.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub name: String,
    pub outcome: WorkflowOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub dispatch_id: Uuid,
    pub trigger: String,
    /// Index version this dispatch ran against.
    pub version: u64,
    pub listener_failures: usize,
    pub workflows: Vec<WorkflowReport>,
}

impl DispatchReport {
    pub fn outcome(&self, workflow: &str) -> Option<&WorkflowOutcome> {
        self.workflows.iter().find(|w| w.name == workflow).map(|w| &w.outcome)
    }

    pub fn is_clean(&self) -> bool {
        self.listener_failures == 0 && !self.workflows.iter().any(|w| matches!(w.outcome, WorkflowOutcome::Failed { .. }))
    }
}

/// Problems found in workflow definitions at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowIssue {
    #[error("workflow at position {position} has no name")]
    MissingName { position: usize },
    #[error("workflow '{workflow}' has an empty trigger")]
    EmptyTrigger { workflow: String },
    #[error("workflow '{workflow}' condition: {error}")]
    Condition { workflow: String, error: ExpressionError },
    #[error("workflow '{workflow}' action {action} {location}: {issue}")]
    Template {
        workflow: String,
        action: usize,
        location: String,
        issue: TemplateIssue,
    },
}

/// Check conditions parse and param templates are well formed.
/// Unrecognized actions are not issues; dispatch skips them.
pub fn validate_workflows(workflows: &[WorkflowDefinition]) -> Vec<WorkflowIssue> {
    let mut issues = Vec::new();
    for (position, definition) in workflows.iter().enumerate() {
        if definition.name.trim().is_empty() {
            issues.push(WorkflowIssue::MissingName { position });
        }
        if definition.trigger.trim().is_empty() {
            issues.push(WorkflowIssue::EmptyTrigger {
                workflow: definition.name.clone(),
            });
        }
        if let Some(Err(error)) = definition.condition.as_deref().map(Expression::parse) {
            issues.push(WorkflowIssue::Condition {
                workflow: definition.name.clone(),
                error,
            });
        }

        for (index, spec) in definition.actions.iter().enumerate() {
            let action = Action::from_spec(spec);
            if !action.is_recognized() {
                warn!(workflow = %definition.name, action = index, "Workflow declares an unrecognized action");
            }
            let Some(params) = action.params() else {
                continue;
            };
            issues.extend(validate_value(params).into_iter().map(|finding| WorkflowIssue::Template {
                workflow: definition.name.clone(),
                action: index,
                location: finding.location,
                issue: finding.issue,
            }));
        }
    }
    issues
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run one workflow's actions in order, stopping at the first failure.
async fn run_workflow(
    handler: &dyn ActionHandler,
    workflow: &CompiledWorkflow,
    trigger: &str,
    event: &DomainEvent,
    context: &SafeContext,
) -> WorkflowOutcome {
    let mut actions_run = 0;
    for action in &workflow.actions {
        if let Action::Unrecognized(raw) = action {
            warn!(workflow = workflow.name(), action = %raw, "Skipping unrecognized action");
            continue;
        }

        let invocation = Invocation {
            trigger,
            workflow: workflow.name(),
            event,
            params: action.params().map(|p| context.interpolate_value(p)).unwrap_or_default(),
        };

        let result = AssertUnwindSafe(handler.execute(action, &invocation))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ActionError::Panicked(panic_message(panic))));

        if let Err(e) = result {
            error!(workflow = workflow.name(), action = action.kind(), error = %e, "Workflow action failed");
            return WorkflowOutcome::Failed {
                actions_run,
                error: e.to_string(),
            };
        }
        actions_run += 1;
    }

    info!(workflow = workflow.name(), actions_run, "Workflow completed");
    WorkflowOutcome::Completed { actions_run }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// `async: true` workflows are detached, the rest awaited.
    PerWorkflow,
    /// Every matched workflow is awaited.
    AwaitAll,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    index: Arc<RwLock<Arc<WorkflowIndex>>>,
    listeners: Arc<RwLock<Arc<ListenerRegistry>>>,
    evaluator: Arc<Evaluator>,
    handler: Arc<dyn ActionHandler>,
}

impl WorkflowEngine {
    pub fn new(evaluator: Arc<Evaluator>, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            index: Arc::new(RwLock::new(Arc::new(WorkflowIndex::default()))),
            listeners: Arc::new(RwLock::new(Arc::new(ListenerRegistry::default()))),
            evaluator,
            handler,
        }
    }

    /// Replace the whole workflow set. Dispatches already running keep the
    /// snapshot they started with. Returns the new index version.
    pub async fn reload(&self, workflows: Vec<WorkflowDefinition>) -> u64 {
        let mut current = self.index.write().await;
        let version = current.version() + 1;
        install(&mut current, version, workflows);
        version
    }

    /// Replace the workflow set under a version chosen by the caller, so a
    /// manifest can stamp its rules and workflows with one number.
    pub(crate) async fn reload_at(&self, version: u64, workflows: Vec<WorkflowDefinition>) {
        let mut current = self.index.write().await;
        install(&mut current, version, workflows);
    }

    pub async fn version(&self) -> u64 {
        self.index.read().await.version()
    }

    pub async fn workflow_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Register a listener for `trigger`; listeners run before workflows in
    /// registration order.
    pub async fn on(&self, trigger: &str, listener: Arc<dyn EventListener>) {
        let mut current = self.listeners.write().await;
        *current = Arc::new(current.with_listener(trigger, listener));
    }

    /// Dispatch honoring each workflow's `async` flag.
    pub async fn emit(&self, trigger: &str, event: &DomainEvent) -> DispatchReport {
        self.dispatch(trigger, event, Delivery::PerWorkflow).await
    }

    /// Dispatch and await every matched workflow, `async` ones included.
    pub async fn emit_and_wait(&self, trigger: &str, event: &DomainEvent) -> DispatchReport {
        self.dispatch(trigger, event, Delivery::AwaitAll).await
    }

    /// Start the whole dispatch in the background. Nothing is returned to
    /// await or cancel; failures are logged only.
    pub fn emit_detached(&self, trigger: impl Into<String>, event: DomainEvent) {
        let trigger = trigger.into();
        let Ok(runtime) = Handle::try_current() else {
            error!(trigger = %trigger, entity_id = %event.entity_id, "No tokio runtime; detached dispatch dropped");
            return;
        };
        let engine = self.clone();
        runtime.spawn(async move {
            let report = engine.dispatch(&trigger, &event, Delivery::PerWorkflow).await;
            if !report.is_clean() {
                warn!(trigger = %report.trigger, dispatch_id = %report.dispatch_id, "Detached dispatch finished with failures");
            }
        });
    }

    async fn dispatch(&self, trigger: &str, event: &DomainEvent, delivery: Delivery) -> DispatchReport {
        let index = Arc::clone(&*self.index.read().await);
        let listeners = Arc::clone(&*self.listeners.read().await);
        let dispatch_id = Uuid::new_v4();
        let span = info_span!("dispatch", trigger, %dispatch_id, version = index.version());

        async move {
            let mut report = DispatchReport {
                dispatch_id,
                trigger: trigger.to_string(),
                version: index.version(),
                listener_failures: 0,
                workflows: Vec::new(),
            };

            for listener in listeners.matching(trigger) {
                let result = AssertUnwindSafe(listener.on_event(trigger, event))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(panic_message(panic).into()));
                if let Err(e) = result {
                    warn!(error = %e, "Event listener failed");
                    report.listener_failures += 1;
                }
            }

            let matched = index.matching(trigger);
            if matched.is_empty() {
                debug!("No workflows registered for trigger");
                return report;
            }

            let conditions = condition_context(event);
            let safe_context = SafeContext::from_event(event, Utc::now());

            for workflow in matched {
                if !should_run(&self.evaluator, workflow.name(), workflow.condition(), &conditions) {
                    report.workflows.push(WorkflowReport {
                        name: workflow.name().to_string(),
                        outcome: WorkflowOutcome::Skipped,
                    });
                    continue;
                }

                let outcome = if workflow.is_async() && delivery == Delivery::PerWorkflow {
                    self.spawn_workflow(Arc::clone(workflow), trigger, event, &safe_context);
                    WorkflowOutcome::Detached
                } else {
                    run_workflow(self.handler.as_ref(), workflow, trigger, event, &safe_context).await
                };

                report.workflows.push(WorkflowReport {
                    name: workflow.name().to_string(),
                    outcome,
                });
            }

            report
        }
        .instrument(span)
        .await
    }

    fn spawn_workflow(&self, workflow: Arc<CompiledWorkflow>, trigger: &str, event: &DomainEvent, context: &SafeContext) {
        let handler = Arc::clone(&self.handler);
        let trigger = trigger.to_string();
        let event = event.clone();
        let context = context.clone();
        debug!(workflow = workflow.name(), "Detaching workflow");

        tokio::spawn(
            async move {
                if let WorkflowOutcome::Failed { error, .. } =
                    run_workflow(handler.as_ref(), &workflow, &trigger, &event, &context).await
                {
                    error!(workflow = workflow.name(), error = %error, "Detached workflow failed");
                }
            }
            .in_current_span(),
        );
    }
}
