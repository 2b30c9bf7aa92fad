//! The feature support ledger.
//!
//! A [`FeatureSet`] maps dotted feature paths to [`SupportDescriptor`]s.
//! Queries walk the hierarchy: an unrecorded path inherits from its nearest
//! recorded ancestor, or is summarized from its recorded children when those
//! were stored as collapsible, or falls back to the catalog default.

use std::collections::BTreeMap;

use super::catalog;
use super::support::{FeatureValue, Support, SupportDescriptor};
use crate::error::{CheckerError, Result};

/// Behaviour note attached when collapsible children disagree.
pub const MIXED_BEHAVIOUR: &str = "mixed support across sub-features";

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    descriptor: SupportDescriptor,
    collapse: bool,
}

/// Mapping from feature path to support descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    entries: BTreeMap<String, Entry>,
}

impl FeatureSet {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a batch of observations.
    ///
    /// With `collapse` set, the entries may later be summarized into a query
    /// on their parent path. Every path must be in the catalog; on error
    /// nothing is recorded.
    pub fn record<I, K, V>(&mut self, entries: I, collapse: bool) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FeatureValue>,
    {
        let mut staged = Vec::new();
        for (path, value) in entries {
            let path = path.into();
            if !catalog::contains(&path) {
                return Err(CheckerError::UnknownFeature { path });
            }
            staged.push((path, value.into().into_descriptor()));
        }
        for (path, descriptor) in staged {
            self.entries.insert(
                path,
                Entry {
                    descriptor,
                    collapse,
                },
            );
        }
        Ok(())
    }

    /// Record a single observation, never collapsible.
    pub fn set(&mut self, path: &str, value: impl Into<FeatureValue>) -> Result<()> {
        self.record([(path, value)], false)
    }

    /// Copy every entry of `other` into this ledger, overwriting duplicates.
    pub fn merge(&mut self, other: &FeatureSet) {
        for (path, entry) in &other.entries {
            self.entries.insert(path.clone(), entry.clone());
        }
    }

    /// Exactly recorded descriptor, without hierarchy lookup.
    pub fn get(&self, path: &str) -> Option<&SupportDescriptor> {
        self.entries.get(path).map(|e| &e.descriptor)
    }

    /// True if `path` itself was recorded.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Recorded paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve `path` to a full descriptor.
    pub fn descriptor(&self, path: &str) -> Result<SupportDescriptor> {
        let info = catalog::lookup(path).ok_or_else(|| CheckerError::UnknownFeature {
            path: path.to_string(),
        })?;

        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.descriptor.clone());
        }

        if let Some(summary) = self.collapsed_children(path) {
            return Ok(summary);
        }

        for ancestor in catalog::ancestors(path) {
            if let Some(entry) = self.entries.get(ancestor) {
                return Ok(entry.descriptor.clone());
            }
        }

        Ok(SupportDescriptor::new(info.default))
    }

    /// Resolve `path` to its support level.
    pub fn support_level(&self, path: &str) -> Result<Support> {
        self.descriptor(path).map(|d| d.support)
    }

    /// True iff `path` resolves to full support.
    pub fn is_supported(&self, path: &str) -> Result<bool> {
        self.support_level(path).map(|s| s.is_full())
    }

    /// Summarize recorded collapsible descendants of `path`.
    fn collapsed_children(&self, path: &str) -> Option<SupportDescriptor> {
        let children: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|(p, _)| catalog::is_ancestor(path, p))
            .map(|(_, e)| e)
            .collect();

        if children.is_empty() || !children.iter().all(|e| e.collapse) {
            return None;
        }

        let first = &children[0].descriptor;
        if children.iter().all(|e| e.descriptor.support == first.support) {
            Some(SupportDescriptor::new(first.support))
        } else {
            Some(SupportDescriptor::new(Support::Unknown).with_behaviour(MIXED_BEHAVIOUR))
        }
    }

    /// Nested-free dump of the ledger.
    ///
    /// In compact form an entry is dropped when its nearest recorded ancestor
    /// carries the same descriptor, since queries would find it there anyway.
    pub fn dotted(&self, compact: bool) -> BTreeMap<String, SupportDescriptor> {
        self.entries
            .iter()
            .filter(|(path, entry)| !compact || !self.implied_by_ancestor(path, &entry.descriptor))
            .map(|(path, entry)| (path.clone(), entry.descriptor.clone()))
            .collect()
    }

    fn implied_by_ancestor(&self, path: &str, descriptor: &SupportDescriptor) -> bool {
        catalog::ancestors(path)
            .find_map(|ancestor| self.entries.get(ancestor))
            .is_some_and(|entry| &entry.descriptor == descriptor)
    }
}
