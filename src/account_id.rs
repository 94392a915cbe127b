//! Canonical account identifiers and the textual encodings they appear in.
//!
//! Every source reaches an account id through one of three shapes:
//!
//! | Encoding | Example | Normalization |
//! |----------|---------|---------------|
//! | Bare | `123456789012` | none |
//! | Hyphenated | `1234-5678-9012` | hyphens removed |
//! | Labeled | `Account ID: AWS-123456789012` | non-digits stripped |
//!
//! All three funnel into [`AccountId::normalize`], the only place where the
//! 12-digit rule is enforced.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Number of digits in a canonical AWS account id.
pub const ACCOUNT_ID_LEN: usize = 12;

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{12}\b").expect("valid bare id pattern"));

static HYPHENATED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9]{4}-[0-9]{4}-[0-9]{4}\b").expect("valid hyphenated id pattern")
});

static LABELED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Account (?:ID|Number):[ \t]*([A-Za-z0-9][A-Za-z0-9-]*)")
        .expect("valid labeled id pattern")
});

/// A 12-digit AWS account id. The join key across every source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Strip every non-digit character and accept the result only if exactly
    /// 12 digits remain.
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == ACCOUNT_ID_LEN {
            Some(Self(digits))
        } else {
            None
        }
    }

    /// Accept `raw` only if it already is a canonical id (surrounding
    /// whitespace aside). Used for exact-match lookups.
    pub fn parse_exact(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == ACCOUNT_ID_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `dddd-dddd-dddd` rendering of this id.
    pub fn hyphenated(&self) -> String {
        format!("{}-{}-{}", &self.0[0..4], &self.0[4..8], &self.0[8..12])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_exact(&value).ok_or_else(|| format!("invalid account id: {:?}", value))
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Which textual shape an id was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Bare,
    Hyphenated,
    Labeled,
}

/// An id found in free text, with the raw token that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMatch {
    pub id: AccountId,
    pub raw: String,
    pub encoding: Encoding,
}

/// Bare 12-digit sequences, in order of appearance.
pub fn find_bare(text: &str) -> Vec<String> {
    BARE_ID
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `dddd-dddd-dddd` sequences, in order of appearance (raw form).
pub fn find_hyphenated(text: &str) -> Vec<String> {
    HYPHENATED_ID
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tokens following an `Account ID:` / `Account Number:` label (raw form).
pub fn find_labeled(text: &str) -> Vec<String> {
    LABELED_ID
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Run all three patterns in priority order (bare, hyphenated, labeled) and
/// return every accepted match. The same id may appear more than once if it
/// was written in several shapes; callers dedupe on [`IdMatch::id`].
pub fn find_all(text: &str) -> Vec<IdMatch> {
    let bare = find_bare(text).into_iter().map(|raw| (raw, Encoding::Bare));
    let hyphenated = find_hyphenated(text)
        .into_iter()
        .map(|raw| (raw, Encoding::Hyphenated));
    let labeled = find_labeled(text)
        .into_iter()
        .map(|raw| (raw, Encoding::Labeled));

    bare.chain(hyphenated)
        .chain(labeled)
        .filter_map(|(raw, encoding)| {
            AccountId::normalize(&raw).map(|id| IdMatch { id, raw, encoding })
        })
        .collect()
}

/// Distinct ids in first-seen order across all three patterns.
pub fn distinct_ids(text: &str) -> Vec<AccountId> {
    let mut seen = Vec::new();
    for m in find_all(text) {
        if !seen.contains(&m.id) {
            seen.push(m.id);
        }
    }
    seen
}
