//! `Gatehouse`: permission checks and workflow dispatch behind one handle.
//!
//! Hosts call [`Gatehouse::check`] (or [`Gatehouse::filter`]) before a
//! mutation or read, then [`Gatehouse::emit`] once the change is committed.
//! Applying a manifest swaps both the per-entity rule registry and the
//! workflow index under one version number; in-flight checks and dispatches
//! finish on the snapshot they started with.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use gatehouse_shared::{AuthState, DomainEvent, EngineManifest, EntityView, PermissionRules};

use crate::auth::PermissionEvaluator;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::expression::Evaluator;
use crate::manifest::validate_manifest;
use crate::services::SmtpMailer;
use crate::workflows::{ActionHandler, BuiltinActions, DispatchReport, EventListener, WorkflowEngine};

#[derive(Debug, Default)]
struct PolicyRegistry {
    version: u64,
    entities: BTreeMap<String, PermissionRules>,
}

#[derive(Clone)]
pub struct Gatehouse {
    policies: Arc<RwLock<Arc<PolicyRegistry>>>,
    permissions: Arc<PermissionEvaluator>,
    workflows: WorkflowEngine,
}

impl Gatehouse {
    pub fn new(config: &EngineConfig, handler: Arc<dyn ActionHandler>) -> Self {
        let evaluator = Arc::new(Evaluator::new(config.expression_cache_size));
        Self {
            policies: Arc::new(RwLock::new(Arc::new(PolicyRegistry::default()))),
            permissions: Arc::new(PermissionEvaluator::new(Arc::clone(&evaluator), config.permission_default)),
            workflows: WorkflowEngine::new(evaluator, handler),
        }
    }

    /// Build with [`BuiltinActions`] wired from `config`: SMTP mailer,
    /// Slack URL, notification recipient, webhook timeout.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let mut actions = BuiltinActions::new(config.webhook_timeout);
        if let Some(smtp) = config.smtp.as_ref().filter(|s| s.is_configured()) {
            let mailer = SmtpMailer::new(smtp).map_err(|e| EngineError::Mailer(e.to_string()))?;
            actions = actions.with_mailer(Arc::new(mailer));
        }
        if let Some(url) = &config.slack_webhook_url {
            actions = actions.with_slack_webhook(url.clone());
        }
        if let Some(to) = &config.notify_email_to {
            actions = actions.with_notify_email(to.clone());
        }
        Ok(Self::new(config, Arc::new(actions)))
    }

    /// Validate then install `manifest`, replacing every rule set and
    /// workflow. Nothing is replaced if validation fails.
    pub async fn apply_manifest(&self, manifest: EngineManifest) -> EngineResult<u64> {
        validate_manifest(&manifest)?;

        let entities: BTreeMap<String, PermissionRules> = manifest
            .entities
            .into_iter()
            .map(|(name, policy)| (name, policy.permissions))
            .collect();
        let entity_count = entities.len();

        // The policy guard is held across the workflow swap so concurrent
        // applies cannot interleave rules and workflows from different manifests.
        let mut current = self.policies.write().await;
        let version = current.version.max(self.workflows.version().await) + 1;
        self.workflows.reload_at(version, manifest.workflows).await;
        *current = Arc::new(PolicyRegistry { version, entities });
        drop(current);

        info!(version, entities = entity_count, "Applied engine manifest");
        Ok(version)
    }

    /// Version of the last applied manifest; 0 before the first.
    pub async fn version(&self) -> u64 {
        self.policies.read().await.version
    }

    /// Rules for `entity`; empty when the entity declares none.
    pub async fn rules(&self, entity: &str) -> PermissionRules {
        self.policies.read().await.entities.get(entity).cloned().unwrap_or_default()
    }

    pub async fn check(&self, entity: &str, auth: &AuthState, snapshot: Option<&EntityView>, action: &str) -> bool {
        let registry = Arc::clone(&*self.policies.read().await);
        let rules = registry.entities.get(entity).cloned().unwrap_or_default();
        self.permissions.check_permission(&rules, auth, snapshot, action)
    }

    pub async fn filter<'a>(
        &self,
        entity: &str,
        auth: &AuthState,
        records: &'a [EntityView],
        action: &str,
    ) -> Vec<&'a EntityView> {
        let rules = self.rules(entity).await;
        self.permissions.filter_permitted(&rules, auth, records, action)
    }

    pub async fn allowed_actions(&self, entity: &str, auth: &AuthState, snapshot: Option<&EntityView>) -> Vec<String> {
        let rules = self.rules(entity).await;
        self.permissions.allowed_actions(&rules, auth, snapshot)
    }

    pub async fn on(&self, trigger: &str, listener: Arc<dyn EventListener>) {
        self.workflows.on(trigger, listener).await;
    }

    pub async fn emit(&self, trigger: &str, event: &DomainEvent) -> DispatchReport {
        self.workflows.emit(trigger, event).await
    }

    pub async fn emit_and_wait(&self, trigger: &str, event: &DomainEvent) -> DispatchReport {
        self.workflows.emit_and_wait(trigger, event).await
    }

    pub fn emit_detached(&self, trigger: impl Into<String>, event: DomainEvent) {
        self.workflows.emit_detached(trigger, event);
    }

    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }
}
