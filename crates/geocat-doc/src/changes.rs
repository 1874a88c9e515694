//! Allowance rules for document updates.
//!
//! An update is described by the differences between the catalogued document
//! and the new one. A [`ChangeRules`] set maps field paths to an
//! [`AllowedChange`]; each difference is judged by the rule at its own path or,
//! failing that, the nearest ancestor path that carries one. Differences with
//! no applicable rule, or whose rule does not permit them, are unsafe.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Difference, DocError, FieldPath};

/// What kind of change a rule permits beneath its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedChange {
    /// Anything may change.
    Any,
    /// The field at the rule path may appear where there was none.
    Addition,
    /// The field at the rule path may disappear.
    Removal,
    /// Direct children of the rule path may be added.
    Extension,
    /// Direct children of the rule path may be removed.
    Truncation,
}

impl AllowedChange {
    /// Whether a rule declared at `rule_path` permits `diff`.
    pub fn permits(self, rule_path: &FieldPath, diff: &Difference) -> bool {
        let is_direct_child = diff.path.parent().as_ref() == Some(rule_path);
        match self {
            AllowedChange::Any => true,
            AllowedChange::Addition => diff.path == *rule_path && diff.left.is_missing(),
            AllowedChange::Removal => diff.path == *rule_path && diff.right.is_missing(),
            AllowedChange::Extension => is_direct_child && diff.left.is_missing(),
            AllowedChange::Truncation => is_direct_child && diff.right.is_missing(),
        }
    }
}

/// Differences split by whether the rule set allows them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedChanges {
    pub safe_changes: Vec<Difference>,
    pub unsafe_changes: Vec<Difference>,
}

impl ClassifiedChanges {
    pub fn is_safe(&self) -> bool {
        self.unsafe_changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRules(BTreeMap<FieldPath, AllowedChange>);

impl ChangeRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, path: FieldPath, change: AllowedChange) -> Self {
        self.0.insert(path, change);
        self
    }

    pub fn insert(&mut self, path: FieldPath, change: AllowedChange) {
        self.0.insert(path, change);
    }

    /// `Any` rules for dotted keys such as `properties.eo:cloud_cover`.
    pub fn allow_any_keys<I, S>(keys: I) -> Result<Self, DocError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::new();
        for key in keys {
            rules.insert(key.as_ref().parse()?, AllowedChange::Any);
        }
        Ok(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Nearest rule at `path` or one of its ancestors.
    pub fn rule_for(&self, path: &FieldPath) -> Option<(FieldPath, AllowedChange)> {
        if let Some(change) = self.0.get(path) {
            return Some((path.clone(), *change));
        }
        path.ancestors()
            .find_map(|ancestor| self.0.get(&ancestor).map(|c| (ancestor.clone(), *c)))
    }

    pub fn classify(&self, diffs: Vec<Difference>) -> ClassifiedChanges {
        let mut out = ClassifiedChanges::default();
        for diff in diffs {
            let allowed = self
                .rule_for(&diff.path)
                .is_some_and(|(rule_path, change)| change.permits(&rule_path, &diff));
            if allowed {
                out.safe_changes.push(diff);
            } else {
                out.unsafe_changes.push(diff);
            }
        }
        out
    }
}
