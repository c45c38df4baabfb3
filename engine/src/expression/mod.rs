//! Restricted expression language for permission rules and workflow
//! conditions.
//!
//! Supports literals, context paths, `==`/`!=`, `<`/`<=`/`>`/`>=`, `!`,
//! `&&`/`||` (short-circuit, `&&` binds tighter) and parentheses. There are
//! no calls, assignments, loops or host escapes; anything outside the grammar
//! is a syntax error reported through [`EvaluationResult`].

mod cache;
mod error;
mod eval;
mod lexer;
mod parser;

use gatehouse_shared::EvaluationResult;

pub use cache::ExpressionCache;
pub use error::ExpressionError;

use crate::context::EvaluationContext;

pub const MAX_EXPRESSION_LEN: usize = 4096;
pub const MAX_DEPTH: usize = 64;

/// A parsed expression, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: parser::Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(ExpressionError::TooLong {
                len: source.len(),
                max: MAX_EXPRESSION_LEN,
            });
        }
        let root = parser::parse(lexer::tokenize(source)?)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, context: &EvaluationContext) -> EvaluationResult {
        EvaluationResult::success(eval::eval(&self.root, context).into_value())
    }
}

/// Parse and evaluate in one step without caching.
pub fn evaluate(expression: &str, context: &EvaluationContext) -> EvaluationResult {
    match Expression::parse(expression) {
        Ok(parsed) => parsed.evaluate(context),
        Err(e) => EvaluationResult::failure(e.to_string()),
    }
}

/// Cached evaluator shared by the permission and workflow layers.
#[derive(Debug, Default)]
pub struct Evaluator {
    cache: ExpressionCache,
}

impl Evaluator {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: ExpressionCache::new(cache_capacity),
        }
    }

    pub fn evaluate(&self, expression: &str, context: &EvaluationContext) -> EvaluationResult {
        match self.cache.get_or_parse(expression) {
            Ok(parsed) => parsed.evaluate(context),
            Err(e) => EvaluationResult::failure(e.to_string()),
        }
    }

    /// Boolean view of [`Evaluator::evaluate`]; failures are `false`.
    pub fn test(&self, expression: &str, context: &EvaluationContext) -> bool {
        self.evaluate(expression, context).passed()
    }

    pub fn cache(&self) -> &ExpressionCache {
        &self.cache
    }
}
