//! Recursive-descent parser.
//!
//! ```text
//! or       := and ( "||" and )*
//! and      := equality ( "&&" equality )*
//! equality := relation ( ( "==" | "!=" ) relation )*
//! relation := unary ( ( "<" | "<=" | ">" | ">=" ) unary )?
//! unary    := "!" unary | primary
//! primary  := literal | path | "(" or ")"
//! ```

use serde_json::Value;

use super::error::ExpressionError;
use super::lexer::{Spanned, Token};
use super::MAX_DEPTH;
use crate::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(Path),
    Not(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

pub(crate) fn parse(tokens: Vec<Spanned>) -> Result<Expr, ExpressionError> {
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some(extra) => Err(unexpected(extra)),
    }
}

fn unexpected(spanned: &Spanned) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        found: spanned.token.to_string(),
        offset: spanned.offset,
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::And) {
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.relation()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Ne) => CompareOp::Ne,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.relation()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relation(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.unary()?;
        let op = match self.peek() {
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.unary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(spanned) = self.tokens.get(self.pos).cloned() else {
            return Err(ExpressionError::UnexpectedEnd);
        };
        self.pos += 1;

        match spanned.token {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            )),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Path(path) => Ok(Expr::Path(path)),
            Token::LParen => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                match self.tokens.get(self.pos) {
                    Some(s) if s.token == Token::RParen => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(unexpected(other)),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            _ => Err(unexpected(&spanned)),
        }
    }
}
