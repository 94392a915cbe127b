//! Core data models used throughout Account Harness.
//!
//! These types represent the candidates produced by extractors and the
//! registry they are merged into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use crate::account_id::AccountId;
use crate::error::SourceError;

/// What a source said about an account.
///
/// Tabular sources yield a field map, document sources a context window of
/// lines. Both are stored verbatim and never coerced into each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptionEntry {
    Fields(BTreeMap<String, String>),
    Lines(Vec<String>),
}

impl DescriptionEntry {
    /// Value of a field, comparing names after trimming whitespace.
    /// Always `None` for line snippets.
    pub fn field(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        match self {
            DescriptionEntry::Fields(map) => map
                .iter()
                .find(|(k, _)| k.trim() == name)
                .map(|(_, v)| v.as_str()),
            DescriptionEntry::Lines(_) => None,
        }
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            DescriptionEntry::Fields(map) => Some(map),
            DescriptionEntry::Lines(_) => None,
        }
    }

    pub fn lines(&self) -> Option<&[String]> {
        match self {
            DescriptionEntry::Lines(lines) => Some(lines),
            DescriptionEntry::Fields(_) => None,
        }
    }
}

/// Raw item produced by an extractor before normalization.
///
/// `raw_id` is whatever text the extractor matched; the merger decides
/// whether it normalizes to a valid [`AccountId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub raw_id: String,
    pub description: DescriptionEntry,
    pub provenance: String,
}

impl Candidate {
    pub fn new(
        raw_id: impl Into<String>,
        description: DescriptionEntry,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            raw_id: raw_id.into(),
            description,
            provenance: provenance.into(),
        }
    }
}

/// Everything one source contributed to a refresh cycle.
///
/// A failed source carries its error and no candidates; it never aborts the
/// rest of the refresh.
#[derive(Debug, Clone)]
pub struct SourceOutput {
    pub source: String,
    pub candidates: Vec<Candidate>,
    pub error: Option<SourceError>,
}

impl SourceOutput {
    pub fn ok(source: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            source: source.into(),
            candidates,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: SourceError) -> Self {
        Self {
            source: source.into(),
            candidates: Vec::new(),
            error: Some(error),
        }
    }
}

/// One account with everything every source said about it.
///
/// Created from its first description, so `descriptions` and `sources` are
/// never empty. Both only grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    id: AccountId,
    descriptions: Vec<DescriptionEntry>,
    sources: Vec<String>,
}

impl AccountRecord {
    pub fn new(id: AccountId, description: DescriptionEntry, source: impl Into<String>) -> Self {
        Self {
            id,
            descriptions: vec![description],
            sources: vec![source.into()],
        }
    }

    /// Rebuild a record from persisted parts. Returns `None` when either list
    /// is empty.
    pub fn from_parts(
        id: AccountId,
        descriptions: Vec<DescriptionEntry>,
        sources: Vec<String>,
    ) -> Option<Self> {
        if descriptions.is_empty() || sources.is_empty() {
            return None;
        }
        Some(Self {
            id,
            descriptions,
            sources,
        })
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn descriptions(&self) -> &[DescriptionEntry] {
        &self.descriptions
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn push(&mut self, description: DescriptionEntry, source: impl Into<String>) {
        self.descriptions.push(description);
        self.sources.push(source.into());
    }

    fn absorb(&mut self, other: AccountRecord) {
        self.descriptions.extend(other.descriptions);
        self.sources.extend(other.sources);
    }
}

/// All known accounts keyed by canonical id, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountRegistry {
    records: BTreeMap<AccountId, AccountRecord>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a description for `id`, creating the record on first sight.
    pub fn append(&mut self, id: AccountId, description: DescriptionEntry, source: String) {
        match self.records.get_mut(&id) {
            Some(record) => record.push(description, source),
            None => {
                self.records
                    .insert(id.clone(), AccountRecord::new(id, description, source));
            }
        }
    }

    /// Insert a whole record, merging with an existing one.
    pub fn insert_record(&mut self, record: AccountRecord) {
        match self.records.get_mut(record.id()) {
            Some(existing) => existing.absorb(record),
            None => {
                self.records.insert(record.id().clone(), record);
            }
        }
    }

    /// Combine two partial registries. Nothing from either side is dropped;
    /// for shared ids `self`'s entries come first.
    pub fn union(mut self, other: AccountRegistry) -> AccountRegistry {
        for (_, record) in other.records {
            self.insert_record(record);
        }
        self
    }

    pub fn get(&self, id: &AccountId) -> Option<&AccountRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &AccountRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &AccountId> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
