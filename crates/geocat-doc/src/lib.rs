//! Geocat metadata documents
//!
//! A metadata document is an ordered tree of fields: mapping keys lead to
//! scalars, sequences, or nested mappings. Documents arrive free-form (YAML or
//! JSON) and are never forced into a fixed schema; every operation in this
//! crate works generically over the value tree:
//!
//! - [`path`]: dotted field paths (`lineage.source_datasets`)
//! - [`layout`]: where a document keeps its identity, lineage and measurements
//! - [`contains`]: structural containment, used to match product signatures
//! - [`diff`]: field-path-addressed differences between two documents
//! - [`changes`]: allowance rules that classify differences as safe or unsafe

pub mod changes;
pub mod contains;
pub mod diff;
pub mod layout;
pub mod path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub use changes::{AllowedChange, ChangeRules, ClassifiedChanges};
pub use contains::{contains, contains_with};
pub use diff::{document_changes, render_differences, value_changes, Difference, FieldValue};
pub use layout::DocLayout;
pub use path::{FieldPath, PathElem};

#[derive(Debug, Error)]
pub enum DocError {
    #[error("metadata document must be a mapping, found {found}")]
    NotAMapping { found: &'static str },
    #[error("invalid identity {value}: expected a UUID")]
    InvalidIdentity { value: String },
    #[error("lineage entry '{classifier}' is not a document")]
    InvalidLineage { classifier: String },
    #[error("lineage field {path} is not a mapping")]
    InvalidLineageField { path: FieldPath },
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
}

/// A metadata document: the root of the value tree is always a mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self, DocError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DocError::NotAMapping {
                found: kind_name(&other),
            }),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Value at `path`, or `None` when any step is absent.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut elems = path.elems().iter();
        let first = match elems.next() {
            Some(PathElem::Key(k)) => self.0.get(k)?,
            Some(PathElem::Index(_)) => return None,
            None => return None,
        };
        elems.try_fold(first, |value, elem| step(value, elem))
    }

    /// Remove the field at `path`, returning what was there.
    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let (last, parent) = match (path.last(), path.parent()) {
            (Some(PathElem::Key(last)), Some(parent)) => (last.clone(), parent),
            _ => return None,
        };
        let container = if parent.is_root() {
            &mut self.0
        } else {
            match self.get_mut(&parent)? {
                Value::Object(map) => map,
                _ => return None,
            }
        };
        container.shift_remove(&last)
    }

    /// Set the field at a key-only `path`, creating intermediate mappings.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), DocError> {
        let mut keys = Vec::with_capacity(path.len());
        for elem in path.elems() {
            match elem {
                PathElem::Key(k) => keys.push(k.as_str()),
                PathElem::Index(_) => return Err(DocError::InvalidPath(path.to_string())),
            }
        }
        let Some((last, intermediate)) = keys.split_last() else {
            return Err(DocError::InvalidPath(path.to_string()));
        };
        let mut map = &mut self.0;
        for key in intermediate {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            map = match entry {
                Value::Object(inner) => inner,
                _ => return Err(DocError::InvalidPath(path.to_string())),
            };
        }
        map.insert(last.to_string(), value);
        Ok(())
    }

    fn get_mut(&mut self, path: &FieldPath) -> Option<&mut Value> {
        let mut elems = path.elems().iter();
        let mut current = match elems.next() {
            Some(PathElem::Key(k)) => self.0.get_mut(k)?,
            _ => return None,
        };
        for elem in elems {
            current = match (current, elem) {
                (Value::Object(map), PathElem::Key(k)) => map.get_mut(k)?,
                (Value::Array(items), PathElem::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Document::from_value(value)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unprintable document>"),
        }
    }
}

fn step<'a>(value: &'a Value, elem: &PathElem) -> Option<&'a Value> {
    match (value, elem) {
        (Value::Object(map), PathElem::Key(k)) => map.get(k),
        (Value::Array(items), PathElem::Index(i)) => items.get(*i),
        _ => None,
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Structural equality over value trees.
///
/// Numbers compare by value, so `1` and `1.0` are equal; everything else
/// compares as `serde_json` does. With `case_sensitive = false` string scalars
/// compare ignoring case.
pub fn values_equal(a: &Value, b: &Value, case_sensitive: bool) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
        }
        (Value::String(x), Value::String(y)) => {
            if case_sensitive {
                x == y
            } else {
                x.to_lowercase() == y.to_lowercase()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| values_equal(x, y, case_sensitive))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| {
                    ys.get(k)
                        .is_some_and(|y| values_equal(x, y, case_sensitive))
                })
        }
        _ => a == b,
    }
}
