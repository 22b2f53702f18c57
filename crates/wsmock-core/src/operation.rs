//! Transforms applied to resolved data before it is sent.
//!
//! A transform never mutates its inputs. When no transform is given, or the
//! transform does not fit the shape of the base value, the base value is
//! returned borrowed so callers can tell nothing was derived.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// The kind of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Shallow object merge; payload keys win.
    Merge,
    /// Recursive object merge; arrays concatenate.
    DeepMerge,
    /// Array concatenation.
    Append,
    /// Replace the served value entirely.
    Raw,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransformKind::Merge => "merge",
            TransformKind::DeepMerge => "deepmerge",
            TransformKind::Append => "append",
            TransformKind::Raw => "raw",
        };
        write!(f, "{}", s)
    }
}

/// A transform descriptor: what to do and the data to do it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "type")]
    pub kind: TransformKind,
    #[serde(rename = "data")]
    pub payload: Value,
}

impl Transform {
    pub fn new(kind: TransformKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    pub fn merge(payload: Value) -> Self {
        Self::new(TransformKind::Merge, payload)
    }

    pub fn deep_merge(payload: Value) -> Self {
        Self::new(TransformKind::DeepMerge, payload)
    }

    pub fn append(payload: Value) -> Self {
        Self::new(TransformKind::Append, payload)
    }

    pub fn raw(payload: Value) -> Self {
        Self::new(TransformKind::Raw, payload)
    }
}

/// Applies an optional transform to `base`.
///
/// Returns `Cow::Borrowed(base)` for no transform and for any transform
/// whose kind does not match the shape of `base` (e.g. `merge` onto an
/// array). Every derived value is a fresh `Cow::Owned`.
pub fn apply<'a>(base: &'a Value, transform: Option<&Transform>) -> Cow<'a, Value> {
    let Some(transform) = transform else {
        return Cow::Borrowed(base);
    };

    match (transform.kind, base, &transform.payload) {
        (TransformKind::Raw, _, payload) => Cow::Owned(payload.clone()),
        (TransformKind::Merge, Value::Object(left), Value::Object(right)) => {
            let mut merged = left.clone();
            for (key, value) in right {
                merged.insert(key.clone(), value.clone());
            }
            Cow::Owned(Value::Object(merged))
        }
        (TransformKind::DeepMerge, Value::Object(left), Value::Object(right)) => {
            Cow::Owned(Value::Object(deep_merge_objects(left, right)))
        }
        (TransformKind::Append, Value::Array(left), Value::Array(right)) => {
            let mut items = Vec::with_capacity(left.len() + right.len());
            items.extend(left.iter().cloned());
            items.extend(right.iter().cloned());
            Cow::Owned(Value::Array(items))
        }
        _ => Cow::Borrowed(base),
    }
}

fn deep_merge_objects(left: &Map<String, Value>, right: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = left.clone();

    for (key, incoming) in right {
        let value = match left.get(key) {
            Some(existing) => deep_merge_values(existing, incoming),
            None => incoming.clone(),
        };
        merged.insert(key.clone(), value);
    }

    merged
}

fn deep_merge_values(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(left), Value::Object(right)) => Value::Object(deep_merge_objects(left, right)),
        (Value::Array(left), Value::Array(right)) => {
            Value::Array(left.iter().chain(right.iter()).cloned().collect())
        }
        _ => incoming.clone(),
    }
}
