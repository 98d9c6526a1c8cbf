//! Bracket-path extraction from JSON payloads.
//!
//! A path is a bare leading key followed by bracketed segments, e.g.
//! `data[prices][0]`. Objects are indexed by key and arrays by decimal index.
//! There are no wildcards and no defaults: every segment must resolve.

use serde_json::Value;
use thiserror::Error;

use super::{ExtractionResult, ResolveError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonPathError {
    #[error("malformed JSON path: {0}")]
    InvalidSelector(String),

    #[error("no such key was found: {0}")]
    KeyNotFound(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("index out of range: {index} (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unexpected value while resolving {0}: not an object or array")]
    UnexpectedValue(String),

    #[error("invalid end value: expected a string or a number")]
    InvalidEndValue,
}

/// Split `head[a][b]` into `["head", "a", "b"]`. An empty head is allowed.
pub fn parse_path(path: &str) -> Result<Vec<&str>, JsonPathError> {
    let mut segments = Vec::new();

    let (head, mut rest) = match path.find('[') {
        Some(i) => path.split_at(i),
        None => (path, ""),
    };
    if head.contains(']') {
        return Err(JsonPathError::InvalidSelector(path.to_string()));
    }
    if !head.is_empty() {
        segments.push(head);
    }

    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .ok_or_else(|| JsonPathError::InvalidSelector(path.to_string()))?;
        let close = inner
            .find(']')
            .ok_or_else(|| JsonPathError::InvalidSelector(path.to_string()))?;
        let segment = &inner[..close];
        if segment.is_empty() || segment.contains('[') {
            return Err(JsonPathError::InvalidSelector(path.to_string()));
        }
        segments.push(segment);
        rest = &inner[close + 1..];
    }

    Ok(segments)
}

pub fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Result<&'a Value, JsonPathError> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .get(*segment)
                .ok_or_else(|| JsonPathError::KeyNotFound(segment.to_string()))?,
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| JsonPathError::InvalidIndex(segment.to_string()))?;
                items.get(index).ok_or(JsonPathError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })?
            }
            _ => return Err(JsonPathError::UnexpectedValue(segment.to_string())),
        };
    }
    Ok(current)
}

/// `path` is the selector without its leading `$`.
pub fn extract(body: &str, path: &str) -> Result<ExtractionResult, ResolveError> {
    let segments = parse_path(path)?;
    let document: Value = serde_json::from_str(body)?;

    match lookup(&document, &segments)? {
        Value::String(s) => Ok(ExtractionResult::Text(s.clone())),
        Value::Number(n) => Ok(ExtractionResult::Number(n.clone())),
        _ => Err(JsonPathError::InvalidEndValue.into()),
    }
}
