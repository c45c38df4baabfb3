//! Dotted lookup paths shared by expressions and templates.
//!
//! A path is a sequence of keys separated by `.`; any key may carry one
//! array index suffix, e.g. `entity.tags[0]` or `data.items[2].name`.
//! Resolution never fails loudly: a missing key, a non-object parent, or an
//! out-of-range index all yield `None`.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '-')
}

impl Path {
    /// Parse `source`, returning `None` on malformed syntax (empty keys,
    /// unbalanced brackets, non-numeric indexes).
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in source.split('.') {
            let (key, index) = match part.find('[') {
                Some(open) => {
                    let rest = &part[open + 1..];
                    let digits = rest.strip_suffix(']')?;
                    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    (&part[..open], Some(digits.parse::<usize>().ok()?))
                }
                None => (part, None),
            };

            if key.is_empty() || !key.chars().all(is_key_char) {
                return None;
            }
            segments.push(Segment::Key(key.to_string()));
            if let Some(i) = index {
                segments.push(Segment::Index(i));
            }
        }

        Some(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve against a root mapping; the first segment is always a key.
    pub fn resolve<'a>(&self, root: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let Segment::Key(key) = first else {
            return None;
        };
        descend(root.get(key)?, rest)
    }

    /// Resolve against an arbitrary value.
    pub fn resolve_value<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        descend(root, &self.segments)
    }
}

fn descend<'a>(mut current: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
