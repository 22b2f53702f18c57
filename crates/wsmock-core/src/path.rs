//! Path handling for the JSON backing store.
//!
//! Two path dialects exist. Request paths (`/api/v1/users`) are read-only and
//! select the subtree served to a session. Write paths (`settings.theme`,
//! `users[0].name`) address the value replaced by `db set`.

use crate::error::PathError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static BRACKET_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z0-9_]+)\]").expect("bracket pattern is valid"));

/// Splits a request path on `/`, skipping empty segments.
///
/// Leading, trailing and repeated slashes are all ignored, so `//a//b/`,
/// `/a/b` and `a/b` yield the same segments.
pub fn split_request_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Resolves a request path against a JSON tree.
///
/// Objects are indexed by key and arrays by decimal index. Returns `None`
/// as soon as a segment is missing or the current value is a scalar.
pub fn resolve<'a>(root: &'a Value, request_path: &str) -> Option<&'a Value> {
    let mut current = root;

    for segment in split_request_path(request_path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(parse_index(segment)?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Normalizes a write path into its segments.
///
/// `a.b[2].c` becomes `["a", "b", "2", "c"]`. A single leading dot is
/// dropped, so `[0].name` addresses the first element of a root array.
pub fn write_path_segments(path: &str) -> Result<Vec<String>, PathError> {
    let dotted = BRACKET_SEGMENT.replace_all(path, ".${1}");
    let normalized = dotted.strip_prefix('.').unwrap_or(&*dotted);

    if normalized.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let segments: Vec<String> = normalized.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(PathError::EmptySegment(path.to_string()));
    }

    Ok(segments)
}

/// Writes `value` at a write path, creating missing intermediate objects.
///
/// Missing intermediates always become empty objects, even when the next
/// segment looks like an array index. Existing scalars (including `null`)
/// are never replaced on the way down.
pub fn set_value_by_path(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments = write_path_segments(path)?;
    let (last, parents) = segments.split_last().ok_or(PathError::EmptyPath)?;

    let mut current = root;
    for segment in parents {
        current = child_or_insert(current, segment)?;
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last)?;
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(value);
            } else {
                items[index] = value;
            }
            Ok(())
        }
        _ => Err(PathError::NotAContainer {
            segment: last.clone(),
        }),
    }
}

fn child_or_insert<'a>(current: &'a mut Value, segment: &str) -> Result<&'a mut Value, PathError> {
    match current {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = array_index(segment)?;
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(Value::Object(Map::new()));
            }
            Ok(&mut items[index])
        }
        _ => Err(PathError::NotAContainer {
            segment: segment.to_string(),
        }),
    }
}

/// Index into an array for writing. Slots past the end are created, with
/// `null` filling any gap.
fn array_index(segment: &str) -> Result<usize, PathError> {
    parse_index(segment).ok_or_else(|| PathError::InvalidIndex {
        segment: segment.to_string(),
    })
}

/// Canonical decimal indexes only: no sign, no leading zeros.
fn parse_index(segment: &str) -> Option<usize> {
    let canonical = segment.bytes().all(|b| b.is_ascii_digit())
        && !(segment.len() > 1 && segment.starts_with('0'));
    if canonical {
        segment.parse().ok()
    } else {
        None
    }
}
