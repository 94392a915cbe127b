//! Vector-search-result extractor.
//!
//! Knowledge-base snippets are short chunks of the indexed account
//! documents. Each one is scanned with the bare 12-digit pattern only.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::account_id::{find_bare, AccountId};
use crate::models::{Candidate, DescriptionEntry};

/// Provenance used when a snippet reports no locator.
pub const DEFAULT_LOCATOR: &str = "knowledge-base";

/// Labels recognised inside a snippet, mapped to the field names tabular
/// sources use so the store's aliases apply to both.
const LABELS: &[(&str, &str)] = &[
    ("Account Name", "AWS account Name"),
    ("Provisioning Date", "Account Provisioning Date"),
    ("Status", "Active / Suspended"),
    ("Classification", "Classification"),
    ("Management Type", "Management Type"),
];

static LABELED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(Account Name|Provisioning Date|Status|Classification|Management Type)\s*:\s*(.+?)\s*$")
        .expect("valid labeled line pattern")
});

static COST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:Total\s+)?Cost\s*:\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:Indian Rupees|INR)?")
        .expect("valid cost line pattern")
});

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    pub locator: Option<String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>, locator: Option<String>) -> Self {
        Self {
            text: text.into(),
            locator,
        }
    }
}

/// Candidates for every 12-digit id in every snippet.
///
/// `label` prefixes the provenance (`kb:<name>`); the snippet's locator, or
/// [`DEFAULT_LOCATOR`], follows it.
pub fn extract_snippets(snippets: &[Snippet], label: &str) -> Vec<Candidate> {
    let mut out = Vec::new();
    for snippet in snippets {
        let locator = snippet
            .locator
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(DEFAULT_LOCATOR);
        let provenance = if label.is_empty() {
            locator.to_string()
        } else {
            format!("{}:{}", label, locator)
        };

        let mut ids: Vec<String> = Vec::new();
        for raw in find_bare(&snippet.text) {
            if AccountId::normalize(&raw).is_some() && !ids.contains(&raw) {
                ids.push(raw);
            }
        }

        let description = describe(&snippet.text, ids.len());
        for raw in ids {
            out.push(Candidate::new(raw, description.clone(), provenance.clone()));
        }
    }
    out
}

/// Labeled fields when the snippet is about exactly one account and carries
/// any, otherwise the snippet's non-blank lines.
fn describe(text: &str, id_count: usize) -> DescriptionEntry {
    if id_count == 1 {
        let fields = labeled_fields(text);
        if !fields.is_empty() {
            return DescriptionEntry::Fields(fields);
        }
    }
    DescriptionEntry::Lines(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn labeled_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for caps in LABELED_LINE.captures_iter(text) {
        let label = &caps[1];
        let Some((_, field)) = LABELS.iter().find(|(l, _)| *l == label) else {
            continue;
        };
        fields
            .entry(field.to_string())
            .or_insert_with(|| caps[2].to_string());
    }
    if let Some(caps) = COST_LINE.captures(text) {
        fields.insert("Total Cost in Indian Rupees".to_string(), caps[1].to_string());
    }
    fields
}
