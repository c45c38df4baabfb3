use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::{Expression, ExpressionError};

type Parsed = Result<Arc<Expression>, ExpressionError>;

/// Parse cache keyed by the literal source text.
///
/// The same handful of rules and conditions is evaluated on every request,
/// so parse results (including syntax errors) are memoised. When the cache
/// reaches capacity it is cleared wholesale; a capacity of zero disables it.
#[derive(Debug)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, Parsed>>,
    capacity: usize,
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub fn get_or_parse(&self, source: &str) -> Parsed {
        if self.capacity == 0 {
            return Expression::parse(source).map(Arc::new);
        }

        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
        {
            return hit.clone();
        }

        debug!(expression = source, "Parsing expression");
        let parsed = Expression::parse(source).map(Arc::new);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(source.to_string(), parsed.clone());
        parsed
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_parsed_tree() {
        let cache = ExpressionCache::new(8);
        let first = cache.get_or_parse("user.id == 'u1'").unwrap();
        let second = cache.get_or_parse("user.id == 'u1'").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_remembers_errors() {
        let cache = ExpressionCache::new(8);
        assert!(cache.get_or_parse("a ==").is_err());
        assert!(cache.get_or_parse("a ==").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_clears_at_capacity() {
        let cache = ExpressionCache::new(2);
        cache.get_or_parse("a").unwrap();
        cache.get_or_parse("b").unwrap();
        cache.get_or_parse("c").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = ExpressionCache::new(0);
        cache.get_or_parse("a").unwrap();
        assert!(cache.is_empty());
    }
}
