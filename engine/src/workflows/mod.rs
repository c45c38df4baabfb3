// Reactive workflow engine
//
// Domain events are dispatched by trigger name to directly registered
// listeners and to declarative workflows (condition + ordered actions).

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod triggers;

pub use actions::{Action, ActionError, ActionResult};
pub use conditions::condition_context;
pub use engine::{validate_workflows, DispatchReport, WorkflowEngine, WorkflowIssue, WorkflowOutcome, WorkflowReport};
pub use executor::{ActionHandler, BuiltinActions, Invocation, RecordSink, DEFAULT_WEBHOOK_TIMEOUT};
pub use triggers::{EventListener, FnListener, ListenerResult, WorkflowIndex};
