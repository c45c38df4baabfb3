//! `${path}` placeholder interpolation for workflow action parameters.
//!
//! Placeholders resolve against a [`SafeContext`] derived once per domain
//! event. A placeholder that does not resolve is left verbatim in the
//! output so misconfigured workflows stay visible in logs and payloads.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

use gatehouse_shared::DomainEvent;

use crate::path::Path;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").expect("placeholder pattern is valid"));

/// Read-only interpolation root for one event.
///
/// Holds the event's own fields (`entity`, `entityId`, `behavior`, `data`,
/// `timestamp`, `user`) plus `now`, `date`, `time`, `entityType` and
/// `actionType`.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeContext {
    root: Value,
}

impl SafeContext {
    pub fn from_event(event: &DomainEvent, now: DateTime<Utc>) -> Self {
        let behavior = event.behavior.clone().map_or(Value::Null, Value::String);
        let user = event
            .user
            .as_ref()
            .and_then(|u| serde_json::to_value(u).ok())
            .unwrap_or(Value::Null);

        let mut root = Map::new();
        root.insert("entity".into(), Value::String(event.entity.clone()));
        root.insert("entityId".into(), Value::String(event.entity_id.clone()));
        root.insert("behavior".into(), behavior.clone());
        root.insert("data".into(), Value::Object(event.data.clone()));
        root.insert("timestamp".into(), Value::String(event.timestamp.to_rfc3339()));
        root.insert("user".into(), user);
        root.insert("now".into(), Value::String(now.to_rfc3339()));
        root.insert("date".into(), Value::String(now.format("%Y-%m-%d").to_string()));
        root.insert("time".into(), Value::String(now.format("%H:%M:%S").to_string()));
        root.insert("entityType".into(), Value::String(event.entity.clone()));
        root.insert("actionType".into(), behavior);

        Self {
            root: Value::Object(root),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn interpolate(&self, template: &str) -> String {
        interpolate(template, &self.root)
    }

    pub fn interpolate_value(&self, value: &Value) -> Value {
        interpolate_value(value, &self.root)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every resolvable `${path}` in `template`.
pub fn interpolate(template: &str, context: &Value) -> String {
    if !template.contains("${") {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            Path::parse(&caps[1])
                .and_then(|path| path.resolve_value(context))
                .map(render)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Deep copy of `value` with every string leaf interpolated.
pub fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate_value(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateIssue {
    #[error("unclosed placeholder at offset {offset}")]
    Unclosed { offset: usize },
    #[error("empty placeholder at offset {offset}")]
    Empty { offset: usize },
    #[error("nested placeholder at offset {offset}")]
    Nested { offset: usize },
    #[error("unmatched closing brace at offset {offset}")]
    UnmatchedClose { offset: usize },
    #[error("invalid placeholder path '{path}' at offset {offset}")]
    InvalidPath { path: String, offset: usize },
}

/// Check placeholder syntax without interpolating. Run at load time.
///
/// Plain `{...}` pairs are literal text; a `}` closing neither a placeholder
/// nor a literal `{` is reported.
pub fn validate_template(template: &str) -> Vec<TemplateIssue> {
    let bytes = template.as_bytes();
    let opens_at = |i: usize| bytes.get(i) == Some(&b'$') && bytes.get(i + 1) == Some(&b'{');
    let mut issues = Vec::new();
    let mut literal_depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if !opens_at(i) {
            match bytes[i] {
                b'{' => literal_depth += 1,
                b'}' if literal_depth > 0 => literal_depth -= 1,
                b'}' => issues.push(TemplateIssue::UnmatchedClose { offset: i }),
                _ => {}
            }
            i += 1;
            continue;
        }

        let start = i;
        let mut depth = 1;
        let mut nested = false;
        let mut j = i + 2;
        while j < bytes.len() && depth > 0 {
            if opens_at(j) {
                depth += 1;
                nested = true;
                j += 2;
                continue;
            }
            if bytes[j] == b'}' {
                depth -= 1;
            }
            j += 1;
        }

        if depth > 0 {
            issues.push(TemplateIssue::Unclosed { offset: start });
            break;
        }

        // `j` is one past the closing brace.
        let inner = template[start + 2..j - 1].trim();
        if nested {
            issues.push(TemplateIssue::Nested { offset: start });
        } else if inner.is_empty() {
            issues.push(TemplateIssue::Empty { offset: start });
        } else if Path::parse(inner).is_none() {
            issues.push(TemplateIssue::InvalidPath {
                path: inner.to_string(),
                offset: start,
            });
        }
        i = j;
    }

    issues
}

/// A template issue found inside a nested parameter structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFinding {
    /// Location of the string leaf, e.g. `headers.X-Id` or `to[1]`.
    pub location: String,
    pub issue: TemplateIssue,
}

/// Validate every string leaf of `value`.
pub fn validate_value(value: &Value) -> Vec<TemplateFinding> {
    let mut findings = Vec::new();
    walk(value, String::new(), &mut findings);
    findings
}

fn walk(value: &Value, location: String, findings: &mut Vec<TemplateFinding>) {
    match value {
        Value::String(s) => findings.extend(validate_template(s).into_iter().map(|issue| TemplateFinding {
            location: location.clone(),
            issue,
        })),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, format!("{location}[{i}]"), findings);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if location.is_empty() {
                    key.clone()
                } else {
                    format!("{location}.{key}")
                };
                walk(item, child, findings);
            }
        }
        _ => {}
    }
}
