//! Tokenizer for the rule/condition language.
//!
//! Tokens: quoted strings (`'..'` or `".."` with `\` escapes), numbers
//! (optionally negative, optionally fractional), `true`/`false`/`null`,
//! paths, `==` `!=` (and the `===` `!==` spellings), `<` `<=` `>` `>=`,
//! `&&` `||` `!`, and parentheses.

use std::fmt;

use super::error::ExpressionError;
use crate::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    Path(Path),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Num(n) => write!(f, "number {n}"),
            Token::True => f.write_str("'true'"),
            Token::False => f.write_str("'false'"),
            Token::Null => f.write_str("'null'"),
            Token::Path(p) => write!(f, "identifier '{p}'"),
            Token::Eq => f.write_str("'=='"),
            Token::Ne => f.write_str("'!='"),
            Token::Lt => f.write_str("'<'"),
            Token::Le => f.write_str("'<='"),
            Token::Gt => f.write_str("'>'"),
            Token::Ge => f.write_str("'>='"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_path_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '.' | '[' | ']')
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '=' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_none() {
                    return Err(ExpressionError::UnexpectedChar { ch: '=', offset });
                }
                chars.next_if(|&(_, c)| c == '=');
                Token::Eq
            }
            '!' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    chars.next_if(|&(_, c)| c == '=');
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '<' | '>' => {
                chars.next();
                let inclusive = chars.next_if(|&(_, c)| c == '=').is_some();
                match (ch, inclusive) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    (_, false) => Token::Gt,
                    (_, true) => Token::Ge,
                }
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == ch).is_none() {
                    return Err(ExpressionError::UnexpectedChar { ch, offset });
                }
                if ch == '&' { Token::And } else { Token::Or }
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(ExpressionError::UnterminatedString { offset });
                }
                Token::Str(value)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some((_, d)) = chars.next_if(|&(_, d)| d.is_ascii_digit() || d == '.') {
                    literal.push(d);
                }
                match literal.parse::<f64>() {
                    Ok(n) if n.is_finite() => Token::Num(n),
                    _ => return Err(ExpressionError::InvalidNumber { literal, offset }),
                }
            }
            c if is_ident_start(c) => {
                let mut raw = String::new();
                while let Some((_, p)) = chars.next_if(|&(_, p)| is_path_char(p)) {
                    raw.push(p);
                }
                match raw.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => match Path::parse(&raw) {
                        Some(path) => Token::Path(path),
                        None => return Err(ExpressionError::InvalidPath { path: raw, offset }),
                    },
                }
            }
            other => return Err(ExpressionError::UnexpectedChar { ch: other, offset }),
        };

        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators_and_aliases() {
        assert_eq!(
            kinds("a === 'x' || b !== 2 && !c"),
            vec![
                Token::Path(Path::parse("a").unwrap()),
                Token::Eq,
                Token::Str("x".into()),
                Token::Or,
                Token::Path(Path::parse("b").unwrap()),
                Token::Ne,
                Token::Num(2.0),
                Token::And,
                Token::Not,
                Token::Path(Path::parse("c").unwrap()),
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"true false null -1.5 "it\"s""#),
            vec![
                Token::True,
                Token::False,
                Token::Null,
                Token::Num(-1.5),
                Token::Str("it\"s".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_host_syntax() {
        assert!(matches!(
            tokenize("a = 1"),
            Err(ExpressionError::UnexpectedChar { ch: '=', .. })
        ));
        assert!(matches!(
            tokenize("a & b"),
            Err(ExpressionError::UnexpectedChar { ch: '&', .. })
        ));
        assert!(matches!(
            tokenize("process.exit(1); x"),
            Err(ExpressionError::UnexpectedChar { ch: ';', .. })
        ));
        assert!(matches!(
            tokenize("'open"),
            Err(ExpressionError::UnterminatedString { offset: 0 })
        ));
        assert!(matches!(tokenize("1.2.3"), Err(ExpressionError::InvalidNumber { .. })));
        assert!(matches!(tokenize("a..b"), Err(ExpressionError::InvalidPath { .. })));
    }
}
