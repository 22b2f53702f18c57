//! The line-oriented command protocol.
//!
//! ```text
//! merge {"id":2}              shallow-merge into the served object
//! deepmerge {"a":{"b":1}}     recursive merge
//! append [{"id":3}]           append to the served array
//! db set settings.theme dark  write into the backing store
//! {"anything":"else"}         send this value instead
//! ```

use crate::error::CommandError;
use crate::operation::{Transform, TransformKind};
use serde_json::Value;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Transform the data served to the active session.
    Transform(Transform),
    /// Persist `value` at `path` in the backing store.
    SetPath { path: String, value: Value },
}

const DB_SET: &str = "db set";

/// Parses one line of input.
///
/// Returns `Ok(None)` for blank input, which callers treat as "resend the
/// unmodified data". Malformed input is an error for the caller to report;
/// it never changes any state.
pub fn parse_command(input: &str) -> Result<Option<Command>, CommandError> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = input.strip_prefix(DB_SET) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return parse_db_set(rest).map(Some);
        }
    }

    for kind in [
        TransformKind::Merge,
        TransformKind::DeepMerge,
        TransformKind::Append,
    ] {
        if let Some(rest) = strip_keyword(input, kind) {
            let transform = parse_shaped_payload(kind, rest)?;
            return Ok(Some(Command::Transform(transform)));
        }
    }

    let payload: Value = serde_json::from_str(input)?;
    Ok(Some(Command::Transform(Transform::raw(payload))))
}

/// Matches `<kind> ` (keyword followed by a single space) at the start of the line.
fn strip_keyword(input: &str, kind: TransformKind) -> Option<&str> {
    let keyword = match kind {
        TransformKind::Merge => "merge",
        TransformKind::DeepMerge => "deepmerge",
        TransformKind::Append => "append",
        TransformKind::Raw => return None,
    };
    input.strip_prefix(keyword)?.strip_prefix(' ')
}

fn parse_shaped_payload(kind: TransformKind, rest: &str) -> Result<Transform, CommandError> {
    let (prefix, expected) = match kind {
        TransformKind::Merge => ("merge", "a JSON object"),
        TransformKind::DeepMerge => ("deepmerge", "a JSON object"),
        _ => ("append", "a JSON array"),
    };

    let payload: Value = serde_json::from_str(rest)
        .map_err(|source| CommandError::InvalidPayload { prefix, source })?;

    let shape_ok = match kind {
        TransformKind::Append => payload.is_array(),
        _ => payload.is_object(),
    };
    if !shape_ok {
        return Err(CommandError::UnexpectedShape { prefix, expected });
    }

    Ok(Transform::new(kind, payload))
}

fn parse_db_set(rest: &str) -> Result<Command, CommandError> {
    let rest = rest.trim_start();
    let (path, raw_value) = match rest.split_once(char::is_whitespace) {
        Some((path, value)) => (path, value.trim_start()),
        None => (rest, ""),
    };

    if path.is_empty() {
        return Err(CommandError::MissingPath);
    }

    Ok(Command::SetPath {
        path: path.to_string(),
        value: parse_set_value(raw_value),
    })
}

/// Interprets the value of a `db set` line: JSON when it parses, otherwise
/// the text itself as a string.
pub fn parse_set_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
