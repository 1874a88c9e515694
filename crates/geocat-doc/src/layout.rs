//! Where a metadata document keeps its identity, lineage and measurements.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{DocError, Document, FieldPath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocLayout {
    /// Field holding the dataset identity (a UUID string).
    pub id: FieldPath,
    /// Mapping of lineage classifier to embedded ancestor document.
    pub sources: FieldPath,
    /// Mapping of measurement name to measurement description.
    pub measurements: FieldPath,
}

impl Default for DocLayout {
    fn default() -> Self {
        Self {
            id: FieldPath::keys(["id"]),
            sources: FieldPath::keys(["lineage", "source_datasets"]),
            measurements: FieldPath::keys(["measurements"]),
        }
    }
}

impl DocLayout {
    /// Identity of `doc`; absent or `null` means the document has none.
    pub fn identity(&self, doc: &Document) -> Result<Option<Uuid>, DocError> {
        match doc.get(&self.id) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Uuid::parse_str(s.trim())
                .map(Some)
                .map_err(|_| DocError::InvalidIdentity { value: s.clone() }),
            Some(other) => Err(DocError::InvalidIdentity {
                value: other.to_string(),
            }),
        }
    }

    /// Embedded lineage documents, in document order.
    pub fn lineage(&self, doc: &Document) -> Result<Vec<(String, Document)>, DocError> {
        match doc.get(&self.sources) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(classifier, value)| match value {
                    Value::Object(map) => Ok((classifier.clone(), Document::from(map.clone()))),
                    _ => Err(DocError::InvalidLineage {
                        classifier: classifier.clone(),
                    }),
                })
                .collect(),
            Some(_) => Err(DocError::InvalidLineageField {
                path: self.sources.clone(),
            }),
        }
    }

    pub fn has_lineage(&self, doc: &Document) -> bool {
        matches!(doc.get(&self.sources), Some(Value::Object(m)) if !m.is_empty())
    }

    /// Copy of `doc` with the lineage field removed, along with any enclosing
    /// mappings left empty by the removal.
    pub fn without_lineage(&self, doc: &Document) -> Document {
        let mut stripped = doc.clone();
        if stripped.remove(&self.sources).is_none() {
            return stripped;
        }
        for ancestor in self.sources.ancestors() {
            if ancestor.is_root() {
                break;
            }
            match stripped.get(&ancestor) {
                Some(Value::Object(m)) if m.is_empty() => {
                    stripped.remove(&ancestor);
                }
                _ => break,
            }
        }
        stripped
    }

    /// Copy of `doc` whose lineage field is `sources`.
    pub fn with_lineage(
        &self,
        doc: &Document,
        sources: Map<String, Value>,
    ) -> Result<Document, DocError> {
        let mut out = doc.clone();
        out.set(&self.sources, Value::Object(sources))?;
        Ok(out)
    }

    /// Measurement names declared by `doc`, or `None` when the field is absent.
    pub fn measurement_names(&self, doc: &Document) -> Option<Vec<String>> {
        match doc.get(&self.measurements) {
            Some(Value::Object(m)) => Some(m.keys().cloned().collect()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(m) => m.get("name").and_then(Value::as_str).map(String::from),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}
