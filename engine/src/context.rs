use serde_json::{Map, Value};

use crate::path::Path;

/// Identifier -> value mapping an expression is evaluated against.
///
/// Built once per evaluation and never mutated afterwards; the builder-style
/// [`EvaluationContext::with`] consumes the context it extends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    values: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Adds every entry of `fields` whose key is not already present.
    pub fn with_defaults(mut self, fields: &Map<String, Value>) -> Self {
        for (key, value) in fields {
            if !self.values.contains_key(key) {
                self.values.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn resolve(&self, path: &Path) -> Option<&Value> {
        path.resolve(&self.values)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<Map<String, Value>> for EvaluationContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
