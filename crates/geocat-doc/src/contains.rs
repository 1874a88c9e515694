//! Structural containment of one document in another.
//!
//! `contains(doc, signature)` holds when every field present in `signature`
//! exists in `doc` with an equal value. Mappings are compared key by key and
//! recursively, so extra fields in `doc` never matter. A `null` in the
//! signature stands for "any mapping" at that position. Sequences and scalars
//! must be equal.

use serde_json::Value;

use crate::{values_equal, Document};

/// Case-sensitive containment of `signature` in `doc`.
pub fn contains(doc: &Document, signature: &Document) -> bool {
    contains_with(doc, signature, true)
}

pub fn contains_with(doc: &Document, signature: &Document, case_sensitive: bool) -> bool {
    signature.as_map().iter().all(|(key, expected)| {
        doc.as_map()
            .get(key)
            .is_some_and(|actual| value_contains(actual, expected, case_sensitive))
    })
}

/// Containment over arbitrary values.
pub fn value_contains(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Object(_), Value::Null) => true,
        (Value::Object(have), Value::Object(want)) => want.iter().all(|(key, expected)| {
            have.get(key)
                .is_some_and(|actual| value_contains(actual, expected, case_sensitive))
        }),
        (Value::Object(_), _) => false,
        _ => values_equal(actual, expected, case_sensitive),
    }
}
