//! Snapshot statistics.
//!
//! A quick summary of what the last successful refresh produced: account
//! counts, how many accounts have structured rows, and a per-source
//! breakdown. Used by `acct stats`.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::merge;
use crate::models::AccountRegistry;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Accounts this source mentioned at least once.
    pub accounts: usize,
    /// Descriptions this source contributed.
    pub descriptions: usize,
}

/// `"kb:primary:s3://b/k#lines=1-3"` → `"kb:primary"`.
fn source_of(provenance: &str) -> &str {
    let mut parts = provenance.splitn(3, ':');
    match (parts.next(), parts.next()) {
        (Some(kind), Some(name)) => {
            let name = name.split('#').next().unwrap_or(name);
            &provenance[..kind.len() + 1 + name.len()]
        }
        _ => provenance.split('#').next().unwrap_or(provenance),
    }
}

pub fn per_source(registry: &AccountRegistry) -> BTreeMap<String, SourceStats> {
    let mut out: BTreeMap<String, SourceStats> = BTreeMap::new();
    for record in registry.records() {
        let mut seen: Vec<&str> = Vec::new();
        for provenance in record.sources() {
            let source = source_of(provenance);
            let entry = out.entry(source.to_string()).or_default();
            entry.descriptions += 1;
            if !seen.contains(&source) {
                seen.push(source);
                entry.accounts += 1;
            }
        }
    }
    out
}

/// `acct stats`
pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.snapshot.path;
    let registry = match merge::load_snapshot(path)? {
        Some(r) => r,
        None => {
            println!("No snapshot at {}. Run `acct refresh` first.", path.display());
            return Ok(());
        }
    };

    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let structured = registry
        .records()
        .filter(|r| r.descriptions().iter().any(|d| d.fields().is_some()))
        .count();
    let descriptions: usize = registry.records().map(|r| r.descriptions().len()).sum();

    println!("Account Harness — Snapshot Stats");
    println!("================================");
    println!();
    println!("  Snapshot:      {}", path.display());
    println!("  Size:          {}", format_bytes(size));
    println!("  Written:       {}", modified);
    println!();
    println!("  Accounts:      {}", registry.len());
    println!("  Structured:    {}", structured);
    println!("  Descriptions:  {}", descriptions);

    let by_source = per_source(&registry);
    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<32} {:>8} {:>12}", "SOURCE", "ACCOUNTS", "DESCRIPTIONS");
        println!("  {}", "-".repeat(54));
        for (source, s) in &by_source {
            println!("  {:<32} {:>8} {:>12}", source, s.accounts, s.descriptions);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, DescriptionEntry, SourceOutput};

    #[test]
    fn source_prefix() {
        assert_eq!(source_of("kb:primary:s3://b/k"), "kb:primary");
        assert_eq!(source_of("table:inv#row=3"), "table:inv");
        assert_eq!(source_of("fs:docs:a/b.md#lines=1-4"), "fs:docs");
        assert_eq!(source_of("knowledge-base"), "knowledge-base");
    }

    #[test]
    fn counts_accounts_once_per_source() {
        let lines = |s: &str| DescriptionEntry::Lines(vec![s.to_string()]);
        let registry = merge::merge(&[SourceOutput::ok(
            "fs:docs",
            vec![
                Candidate::new("123456789012", lines("a"), "fs:docs:a.md#lines=1-2"),
                Candidate::new("123456789012", lines("b"), "fs:docs:b.md#lines=4-5"),
                Candidate::new("210987654321", lines("c"), "table:inv#row=1"),
            ],
        )]);
        let stats = per_source(&registry);
        assert_eq!(
            stats["fs:docs"],
            SourceStats {
                accounts: 1,
                descriptions: 2
            }
        );
        assert_eq!(stats["table:inv"].accounts, 1);
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
