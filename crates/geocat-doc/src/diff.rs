//! Field-path-addressed differences between two documents.
//!
//! Mappings are compared over the union of their keys and sequences index by
//! index; every other mismatch produces one [`Difference`] at the current
//! path. A side that has no value at a path is [`FieldValue::Missing`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{values_equal, Document, FieldPath};

/// One side of a difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Missing,
    Present(Value),
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldValue::Missing => None,
            FieldValue::Present(v) => Some(v),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Missing => f.write_str("missing"),
            FieldValue::Present(v) => write!(f, "{v}"),
        }
    }
}

/// A field whose value differs between the first (`left`) and second (`right`) document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub path: FieldPath,
    pub left: FieldValue,
    pub right: FieldValue,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}!={}", self.path, self.left, self.right)
    }
}

/// Render differences the way error reports show them: `a.b: 1!=2, c: missing!="x"`.
pub fn render_differences(diffs: &[Difference]) -> String {
    diffs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Differences between two documents, sorted by path. Empty means consistent.
pub fn document_changes(left: &Document, right: &Document) -> Vec<Difference> {
    let mut out = Vec::new();
    map_changes(left.as_map(), right.as_map(), &FieldPath::root(), &mut out);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Differences between two arbitrary values, sorted by path.
pub fn value_changes(left: &Value, right: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    collect(
        &FieldValue::Present(left.clone()),
        &FieldValue::Present(right.clone()),
        &FieldPath::root(),
        &mut out,
    );
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn collect(left: &FieldValue, right: &FieldValue, path: &FieldPath, out: &mut Vec<Difference>) {
    match (left, right) {
        (FieldValue::Missing, FieldValue::Missing) => {}
        (FieldValue::Present(l), FieldValue::Present(r)) => {
            if values_equal(l, r, true) {
                return;
            }
            match (l, r) {
                (Value::Object(lm), Value::Object(rm)) => map_changes(lm, rm, path, out),
                (Value::Array(ls), Value::Array(rs)) => {
                    for idx in 0..ls.len().max(rs.len()) {
                        collect(
                            &present(ls.get(idx)),
                            &present(rs.get(idx)),
                            &path.child(idx),
                            out,
                        );
                    }
                }
                _ => out.push(Difference {
                    path: path.clone(),
                    left: left.clone(),
                    right: right.clone(),
                }),
            }
        }
        _ => out.push(Difference {
            path: path.clone(),
            left: left.clone(),
            right: right.clone(),
        }),
    }
}

fn map_changes(
    left: &serde_json::Map<String, Value>,
    right: &serde_json::Map<String, Value>,
    path: &FieldPath,
    out: &mut Vec<Difference>,
) {
    let right_only = right.keys().filter(|k| !left.contains_key(*k));
    for key in left.keys().chain(right_only) {
        collect(
            &present(left.get(key)),
            &present(right.get(key)),
            &path.child(key.as_str()),
            out,
        );
    }
}

fn present(value: Option<&Value>) -> FieldValue {
    match value {
        Some(v) => FieldValue::Present(v.clone()),
        None => FieldValue::Missing,
    }
}
