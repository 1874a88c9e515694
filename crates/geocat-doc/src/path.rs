//! Field paths into a metadata document.
//!
//! A path is a sequence of mapping keys and sequence indices. Paths render in
//! dotted form (`lineage.source_datasets`, `image.bands.0`) and parse back from
//! it; an all-digit segment is read as a sequence index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DocError;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElem {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Key(k) => f.write_str(k),
            PathElem::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathElem {
    fn from(key: &str) -> Self {
        PathElem::Key(key.to_string())
    }
}

impl From<String> for PathElem {
    fn from(key: String) -> Self {
        PathElem::Key(key)
    }
}

impl From<usize> for PathElem {
    fn from(index: usize) -> Self {
        PathElem::Index(index)
    }
}

/// Address of a field inside a document. The empty path is the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathElem>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path made only of mapping keys.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| PathElem::Key(k.into())).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn elems(&self) -> &[PathElem] {
        &self.0
    }

    pub fn last(&self) -> Option<&PathElem> {
        self.0.last()
    }

    /// A new path one step deeper.
    pub fn child(&self, elem: impl Into<PathElem>) -> Self {
        let mut elems = self.0.clone();
        elems.push(elem.into());
        Self(elems)
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Strict ancestors, nearest first, ending with the root path.
    pub fn ancestors(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (0..self.0.len()).rev().map(move |n| Self(self.0[..n].to_vec()))
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{elem}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut elems = Vec::new();
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(DocError::InvalidPath(s.to_string()));
            }
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                let index = segment
                    .parse::<usize>()
                    .map_err(|_| DocError::InvalidPath(s.to_string()))?;
                elems.push(PathElem::Index(index));
            } else {
                elems.push(PathElem::Key(segment.to_string()));
            }
        }
        Ok(Self(elems))
    }
}

impl<E: Into<PathElem>> FromIterator<E> for FieldPath {
    fn from_iter<T: IntoIterator<Item = E>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
