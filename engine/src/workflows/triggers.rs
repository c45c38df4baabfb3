// Workflow triggers - the trigger -> workflow index and direct listeners

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use gatehouse_shared::{DomainEvent, WorkflowDefinition};

use super::actions::Action;

/// A workflow with its actions resolved to the closed [`Action`] set.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub definition: WorkflowDefinition,
    pub actions: Vec<Action>,
}

impl CompiledWorkflow {
    pub fn compile(definition: WorkflowDefinition) -> Self {
        let actions = definition.actions.iter().map(Action::from_spec).collect();
        Self { definition, actions }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn condition(&self) -> Option<&str> {
        self.definition.condition.as_deref()
    }

    pub fn is_async(&self) -> bool {
        self.definition.is_async
    }
}

/// Immutable trigger -> workflows snapshot. Reload builds a new one; a
/// dispatch holds the snapshot it started with.
#[derive(Debug, Default)]
pub struct WorkflowIndex {
    version: u64,
    by_trigger: HashMap<String, Vec<Arc<CompiledWorkflow>>>,
    len: usize,
}

impl WorkflowIndex {
    /// Group `workflows` by trigger, keeping declaration order per trigger.
    pub fn build(version: u64, workflows: Vec<WorkflowDefinition>) -> Self {
        let len = workflows.len();
        let mut by_trigger: HashMap<String, Vec<Arc<CompiledWorkflow>>> = HashMap::new();
        for definition in workflows {
            by_trigger
                .entry(definition.trigger.clone())
                .or_default()
                .push(Arc::new(CompiledWorkflow::compile(definition)));
        }
        Self {
            version,
            by_trigger,
            len,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn matching(&self, trigger: &str) -> &[Arc<CompiledWorkflow>] {
        self.by_trigger.get(trigger).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn trigger_count(&self) -> usize {
        self.by_trigger.len()
    }
}

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Code registered directly against a trigger, run before workflows.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, trigger: &str, event: &DomainEvent) -> ListenerResult;
}

/// Adapts an async closure into an [`EventListener`].
pub struct FnListener<F>(F);

impl<F, Fut> FnListener<F>
where
    F: Fn(String, DomainEvent) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(String, DomainEvent) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send,
{
    async fn on_event(&self, trigger: &str, event: &DomainEvent) -> ListenerResult {
        (self.0)(trigger.to_string(), event.clone()).await
    }
}

/// Copy-on-write listener table; registration swaps in a new snapshot.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    by_trigger: HashMap<String, Vec<Arc<dyn EventListener>>>,
}

impl ListenerRegistry {
    pub fn with_listener(&self, trigger: &str, listener: Arc<dyn EventListener>) -> Self {
        let mut next = self.clone();
        next.by_trigger.entry(trigger.to_string()).or_default().push(listener);
        next
    }

    pub fn matching(&self, trigger: &str) -> &[Arc<dyn EventListener>] {
        self.by_trigger.get(trigger).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_shared::ActionSpec;

    fn workflow(name: &str, trigger: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(name, trigger).with_action(ActionSpec::tag("log"))
    }

    #[test]
    fn test_index_groups_by_trigger_in_order() {
        let index = WorkflowIndex::build(
            3,
            vec![
                workflow("first", "task.created"),
                workflow("other", "task.deleted"),
                workflow("second", "task.created"),
            ],
        );

        let names: Vec<&str> = index.matching("task.created").iter().map(|w| w.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(index.version(), 3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.trigger_count(), 2);
        assert!(index.matching("task.updated").is_empty());
    }

    #[test]
    fn test_compile_resolves_actions() {
        let compiled = CompiledWorkflow::compile(
            workflow("w", "t").with_action(ActionSpec::tag("bogus")).detached(),
        );
        assert_eq!(compiled.actions, vec![Action::Log(serde_json::Value::Null), Action::Unrecognized("bogus".into())]);
        assert!(compiled.is_async());
    }

    #[tokio::test]
    async fn test_listener_registry_is_copy_on_write() {
        let empty = ListenerRegistry::default();
        let listener = Arc::new(FnListener::new(|_trigger, _event| async { Ok(()) }));
        let next = empty.with_listener("task.created", listener);

        assert!(empty.matching("task.created").is_empty());
        assert_eq!(next.matching("task.created").len(), 1);

        let event = DomainEvent::new("Task", "1", Default::default());
        assert!(next.matching("task.created")[0].on_event("task.created", &event).await.is_ok());
    }
}
