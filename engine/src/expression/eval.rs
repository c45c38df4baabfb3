//! Tree-walking evaluation over an [`EvaluationContext`].
//!
//! Evaluation is total: every well-formed tree produces an operand. A path
//! that does not resolve yields [`Operand::Missing`], which is falsy and
//! makes every comparison it takes part in false, `!=` included. Only a
//! value that resolves to an actual `null` equals `null`.

use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

use gatehouse_shared::is_truthy;

use super::parser::{CompareOp, Expr};
use crate::context::EvaluationContext;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand<'a> {
    Missing,
    Present(Cow<'a, Value>),
}

impl Operand<'_> {
    fn truthy(&self) -> bool {
        match self {
            Operand::Missing => false,
            Operand::Present(v) => is_truthy(v),
        }
    }

    pub(crate) fn into_value(self) -> Option<Value> {
        match self {
            Operand::Missing => None,
            Operand::Present(v) => Some(v.into_owned()),
        }
    }
}

fn boolean(b: bool) -> Operand<'static> {
    Operand::Present(Cow::Owned(Value::Bool(b)))
}

pub(crate) fn eval<'a>(expr: &'a Expr, ctx: &'a EvaluationContext) -> Operand<'a> {
    match expr {
        Expr::Literal(value) => Operand::Present(Cow::Borrowed(value)),
        Expr::Path(path) => match ctx.resolve(path) {
            Some(value) => Operand::Present(Cow::Borrowed(value)),
            None => Operand::Missing,
        },
        Expr::Not(inner) => boolean(!eval(inner, ctx).truthy()),
        // `&&` / `||` yield the deciding operand, not a coerced boolean.
        Expr::And(lhs, rhs) => {
            let left = eval(lhs, ctx);
            if left.truthy() { eval(rhs, ctx) } else { left }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs, ctx);
            if left.truthy() { left } else { eval(rhs, ctx) }
        }
        Expr::Compare(op, lhs, rhs) => {
            let left = eval(lhs, ctx);
            let right = eval(rhs, ctx);
            boolean(compare(*op, &left, &right))
        }
    }
}

fn compare(op: CompareOp, left: &Operand<'_>, right: &Operand<'_>) -> bool {
    let (Operand::Present(l), Operand::Present(r)) = (left, right) else {
        return false;
    };
    match op {
        CompareOp::Eq => loosely_equal(l, r),
        CompareOp::Ne => !loosely_equal(l, r),
        CompareOp::Lt => order(l, r) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(l, r), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(l, r) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(order(l, r), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Ordering is defined only between two numbers or two strings.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
