//! Registry merger and snapshot persistence.
//!
//! Each source's candidates are folded into a partial registry on its own;
//! partials are then combined with [`AccountRegistry::union`]. Candidates
//! whose id does not normalize to 12 digits are dropped here and nowhere
//! else.
//!
//! When a refresh produces nothing, the fallback chain is: the previously
//! published registry, then the snapshot on disk, then an empty registry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::RefreshError;
use crate::models::{AccountId, AccountRecord, AccountRegistry, DescriptionEntry, SourceOutput};

/// Where the published registry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryOrigin {
    /// Built by this refresh.
    Fresh,
    /// Kept from the previous refresh because this one found nothing.
    Previous,
    /// Loaded from the persisted snapshot.
    Snapshot,
    /// Nothing available anywhere; queries answer "no data".
    Empty,
}

impl RegistryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryOrigin::Fresh => "fresh",
            RegistryOrigin::Previous => "previous",
            RegistryOrigin::Snapshot => "snapshot",
            RegistryOrigin::Empty => "empty",
        }
    }
}

/// Fold one source's candidates into a registry.
pub fn partial(output: &SourceOutput) -> AccountRegistry {
    let mut registry = AccountRegistry::new();
    let mut dropped = 0usize;
    for candidate in &output.candidates {
        match AccountId::normalize(&candidate.raw_id) {
            Some(id) => registry.append(
                id,
                candidate.description.clone(),
                candidate.provenance.clone(),
            ),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::debug!(source = %output.source, dropped, "discarded malformed candidates");
    }
    registry
}

/// Merge every source's output into one registry.
pub fn merge(outputs: &[SourceOutput]) -> AccountRegistry {
    outputs
        .iter()
        .map(partial)
        .fold(AccountRegistry::new(), AccountRegistry::union)
}

fn require_non_empty(registry: AccountRegistry) -> Result<AccountRegistry, RefreshError> {
    if registry.is_empty() {
        Err(RefreshError::EmptyRegistry)
    } else {
        Ok(registry)
    }
}

/// Pick the registry to publish after a refresh.
pub fn with_fallback(
    fresh: AccountRegistry,
    previous: Option<&AccountRegistry>,
    snapshot_path: &Path,
) -> (AccountRegistry, RegistryOrigin) {
    let err = match require_non_empty(fresh) {
        Ok(registry) => return (registry, RegistryOrigin::Fresh),
        Err(err) => err,
    };
    tracing::warn!(error = %err, "falling back");

    if let Some(prev) = previous.filter(|p| !p.is_empty()) {
        return (prev.clone(), RegistryOrigin::Previous);
    }

    match load_snapshot(snapshot_path) {
        Ok(Some(registry)) if !registry.is_empty() => (registry, RegistryOrigin::Snapshot),
        Ok(_) => (AccountRegistry::new(), RegistryOrigin::Empty),
        Err(e) => {
            let err = RefreshError::Snapshot {
                path: snapshot_path.display().to_string(),
                message: format!("{:#}", e),
            };
            tracing::warn!(error = %err, "ignoring snapshot");
            (AccountRegistry::new(), RegistryOrigin::Empty)
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    descriptions: Vec<DescriptionEntry>,
    sources: Vec<String>,
}

/// Write `registry` as `{ "<id>": { "descriptions": [...], "sources": [...] } }`.
///
/// The file is written next to its destination and renamed into place, so a
/// reader never sees a partial snapshot.
pub fn save_snapshot(registry: &AccountRegistry, path: &Path) -> Result<()> {
    let doc: BTreeMap<&str, SnapshotRecord> = registry
        .records()
        .map(|r| {
            (
                r.id().as_str(),
                SnapshotRecord {
                    descriptions: r.descriptions().to_vec(),
                    sources: r.sources().to_vec(),
                },
            )
        })
        .collect();
    let json = serde_json::to_vec_pretty(&doc)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into place: {}", path.display()))?;
    Ok(())
}

/// Load the snapshot at `path`. `Ok(None)` when the file does not exist.
///
/// Keys that are not canonical ids and records with empty lists are
/// dropped.
pub fn load_snapshot(path: &Path) -> Result<Option<AccountRegistry>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read snapshot: {}", path.display()))
        }
    };
    let doc: BTreeMap<String, SnapshotRecord> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;

    let mut registry = AccountRegistry::new();
    for (key, rec) in doc {
        let Some(id) = AccountId::parse_exact(&key) else {
            tracing::warn!(key = %key, "dropping invalid snapshot key");
            continue;
        };
        match AccountRecord::from_parts(id, rec.descriptions, rec.sources) {
            Some(record) => registry.insert_record(record),
            None => tracing::warn!(key = %key, "dropping empty snapshot record"),
        }
    }
    Ok(Some(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::models::Candidate;

    fn lines(s: &str) -> DescriptionEntry {
        DescriptionEntry::Lines(vec![s.to_string()])
    }

    fn output(source: &str, cands: &[(&str, &str)]) -> SourceOutput {
        SourceOutput::ok(
            source,
            cands
                .iter()
                .map(|(id, text)| Candidate::new(*id, lines(text), format!("{}#x", source)))
                .collect(),
        )
    }

    fn id(s: &str) -> AccountId {
        AccountId::normalize(s).unwrap()
    }

    #[test]
    fn malformed_candidates_are_discarded() {
        let reg = merge(&[output("a", &[("123456789012", "ok"), ("12345", "short")])]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn same_id_from_two_sources_keeps_both() {
        let reg = merge(&[
            output("table", &[("123456789012", "row")]),
            output("doc", &[("1234-5678-9012", "mention")]),
        ]);
        let rec = reg.get(&id("123456789012")).unwrap();
        assert_eq!(rec.descriptions().len(), 2);
        assert_eq!(rec.sources(), &["table#x".to_string(), "doc#x".to_string()]);
    }

    #[test]
    fn merge_order_does_not_change_content() {
        let a = output("a", &[("111122223333", "a1"), ("444455556666", "a2")]);
        let b = output("b", &[("111122223333", "b1")]);
        let ab = merge(&[a.clone(), b.clone()]);
        let ba = merge(&[b, a]);

        assert_eq!(ab.len(), ba.len());
        for rec in ab.records() {
            let other = ba.get(rec.id()).unwrap();
            let mut left: Vec<_> = rec.sources().to_vec();
            let mut right: Vec<_> = other.sources().to_vec();
            left.sort();
            right.sort();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn merging_twice_loses_nothing() {
        let x = [
            output("a", &[("111122223333", "a1"), ("444455556666", "a2")]),
            output("b", &[("111122223333", "b1")]),
        ];
        let once = merge(&x);
        let twice = merge(&x).union(merge(&x));

        let triples = |reg: &AccountRegistry| {
            let mut set = std::collections::BTreeSet::new();
            for rec in reg.records() {
                for (d, s) in rec.descriptions().iter().zip(rec.sources()) {
                    set.insert((
                        rec.id().to_string(),
                        serde_json::to_string(d).unwrap(),
                        s.clone(),
                    ));
                }
            }
            set
        };
        assert_eq!(triples(&once), triples(&twice));
        assert_eq!(
            twice.get(&id("111122223333")).unwrap().descriptions().len(),
            4
        );
    }

    #[test]
    fn duplicate_descriptions_are_appended() {
        let reg = merge(&[output("a", &[("123456789012", "same"), ("123456789012", "same")])]);
        assert_eq!(reg.get(&id("123456789012")).unwrap().descriptions().len(), 2);
    }

    #[test]
    fn failed_source_contributes_nothing() {
        let failed = SourceOutput::failed("kb", SourceError::unavailable("kb", "down"));
        let reg = merge(&[failed, output("t", &[("123456789012", "row")])]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/snap.json");
        let reg = merge(&[output("a", &[("123456789012", "x"), ("210987654321", "y")])]);

        save_snapshot(&reg, &path).unwrap();
        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded, reg);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn snapshot_load_drops_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(
            &path,
            r#"{
                "123456789012": { "descriptions": [["a"]], "sources": ["s"] },
                "12345": { "descriptions": [["b"]], "sources": ["s"] },
                "210987654321": { "descriptions": [], "sources": [] }
            }"#,
        )
        .unwrap();
        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn fallback_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let fresh = merge(&[output("a", &[("123456789012", "x")])]);

        let (_, origin) = with_fallback(fresh.clone(), None, &path);
        assert_eq!(origin, RegistryOrigin::Fresh);

        let (reg, origin) = with_fallback(AccountRegistry::new(), None, &path);
        assert_eq!(origin, RegistryOrigin::Empty);
        assert!(reg.is_empty());

        save_snapshot(&fresh, &path).unwrap();
        let (reg, origin) = with_fallback(AccountRegistry::new(), None, &path);
        assert_eq!(origin, RegistryOrigin::Snapshot);
        assert_eq!(reg.len(), 1);

        let previous = merge(&[output("p", &[("210987654321", "p")])]);
        let (reg, origin) = with_fallback(AccountRegistry::new(), Some(&previous), &path);
        assert_eq!(origin, RegistryOrigin::Previous);
        assert!(reg.get(&id("210987654321")).is_some());
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, "not json").unwrap();
        let (_, origin) = with_fallback(AccountRegistry::new(), None, &path);
        assert_eq!(origin, RegistryOrigin::Empty);
    }
}
