//! Loading and validating the declarative engine manifest.

use std::path::Path as FsPath;
use tracing::info;

use gatehouse_shared::EngineManifest;

use crate::auth::validate_rules;
use crate::error::{EngineResult, ValidationBuilder};
use crate::workflows::{validate_workflows, WorkflowIssue};

pub fn parse_manifest(json: &str) -> EngineResult<EngineManifest> {
    Ok(serde_json::from_str(json)?)
}

pub fn read_manifest(path: impl AsRef<FsPath>) -> EngineResult<EngineManifest> {
    let path = path.as_ref();
    let manifest = parse_manifest(&std::fs::read_to_string(path)?)?;
    info!(
        path = %path.display(),
        entities = manifest.entities.len(),
        workflows = manifest.workflows.len(),
        "Read engine manifest"
    );
    Ok(manifest)
}

fn workflow_location(issue: &WorkflowIssue, manifest: &EngineManifest) -> String {
    let position = match issue {
        WorkflowIssue::MissingName { position } => Some(*position),
        WorkflowIssue::EmptyTrigger { workflow }
        | WorkflowIssue::Condition { workflow, .. }
        | WorkflowIssue::Template { workflow, .. } => manifest.workflows.iter().position(|w| &w.name == workflow),
    };
    match position {
        Some(i) => format!("workflows[{i}]"),
        None => "workflows".to_string(),
    }
}

/// Parse every permission rule and workflow condition, and check every
/// action template. All problems are reported together.
pub fn validate_manifest(manifest: &EngineManifest) -> EngineResult<()> {
    let mut errors = ValidationBuilder::new();

    for (entity, policy) in &manifest.entities {
        for issue in validate_rules(&policy.permissions) {
            errors.error(format!("entities.{entity}.permissions.{}", issue.action), issue.error.to_string());
        }
    }

    for issue in validate_workflows(&manifest.workflows) {
        errors.error(workflow_location(&issue, manifest), issue.to_string());
    }

    errors.finish()
}
