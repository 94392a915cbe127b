//! Read-only query surface over one published registry.
//!
//! Sources disagree on column names, so every logical field ("status",
//! "cost", ...) resolves through an ordered alias list. Within one
//! description the first alias present wins.
//!
//! | Field | Aliases |
//! |-------|---------|
//! | `name` | `AWS account Name`, `AWS Account Name`, `Account Name` |
//! | `status` | `Active / Suspended`, `Status` |
//! | `classification` | `Classification`, ` Classification`, `Classfication` |
//! | `management` | `Management Type` |
//! | `provisioning_date` | `Account Provisioning Date`, `Provisioning Date` |
//! | `cost` | `Total Cost in Indian Rupees`, `Total Cost`, `Cost` |
//!
//! List operations return every match; capping for display is the
//! formatter's job.

use crate::merge::RegistryOrigin;
use crate::models::{AccountId, AccountRecord, AccountRegistry, DescriptionEntry};

const FIELD_ALIASES: &[(&str, &[&str])] = &[
    (
        "name",
        &["AWS account Name", "AWS Account Name", "Account Name"],
    ),
    ("status", &["Active / Suspended", "Status"]),
    (
        "classification",
        &["Classification", " Classification", "Classfication"],
    ),
    ("management", &["Management Type"]),
    (
        "provisioning_date",
        &["Account Provisioning Date", "Provisioning Date"],
    ),
    ("cost", &["Total Cost in Indian Rupees", "Total Cost", "Cost"]),
];

/// Column names to try for a logical field, in priority order. Unknown
/// names are used verbatim.
pub fn aliases(field: &str) -> Vec<&str> {
    let key = field.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    let key = match key.as_str() {
        "management_type" => "management",
        "provision_date" | "provisioning" => "provisioning_date",
        "total_cost" => "cost",
        "account_name" => "name",
        other => other,
    }
    .to_string();
    match FIELD_ALIASES.iter().find(|(name, _)| *name == key) {
        Some((_, list)) => list.to_vec(),
        None => vec![field],
    }
}

/// Value of a logical field in one description, honoring alias priority.
pub fn description_value<'a>(entry: &'a DescriptionEntry, field: &str) -> Option<&'a str> {
    aliases(field).into_iter().find_map(|alias| entry.field(alias))
}

/// Value of a logical field from the first description that has it.
pub fn field_value<'a>(record: &'a AccountRecord, field: &str) -> Option<&'a str> {
    record
        .descriptions()
        .iter()
        .find_map(|d| description_value(d, field))
}

/// Parse a cost cell: commas and surrounding whitespace are ignored.
pub fn parse_cost(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone)]
pub struct AccountStore {
    registry: AccountRegistry,
    origin: RegistryOrigin,
}

impl AccountStore {
    pub fn new(registry: AccountRegistry, origin: RegistryOrigin) -> Self {
        Self { registry, origin }
    }

    pub fn empty() -> Self {
        Self::new(AccountRegistry::new(), RegistryOrigin::Empty)
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn origin(&self) -> RegistryOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Exact match on the canonical id, else exact (case-sensitive) match on
    /// any name-like field of any record.
    pub fn lookup(&self, id_or_name: &str) -> Option<&AccountRecord> {
        if let Some(id) = AccountId::parse_exact(id_or_name) {
            if let Some(record) = self.registry.get(&id) {
                return Some(record);
            }
        }
        let wanted = id_or_name.trim();
        if wanted.is_empty() {
            return None;
        }
        let name_aliases = aliases("name");
        self.registry.records().find(|record| {
            record.descriptions().iter().any(|d| {
                name_aliases
                    .iter()
                    .filter_map(|alias| d.field(alias))
                    .any(|v| v.trim() == wanted)
            })
        })
    }

    pub fn list_all(&self) -> Vec<&AccountRecord> {
        self.registry.records().collect()
    }

    /// Records with at least one structured description whose `field`
    /// equals `value`, ignoring case.
    pub fn filter_by_field(&self, field: &str, value: &str) -> Vec<&AccountRecord> {
        let wanted = value.trim();
        self.registry
            .records()
            .filter(|record| {
                record.descriptions().iter().any(|d| {
                    description_value(d, field)
                        .map(|v| v.trim().eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Sum of every numeric cost field across all descriptions. Missing and
    /// non-numeric values are skipped.
    pub fn total_cost(&self) -> f64 {
        self.registry
            .records()
            .flat_map(|r| r.descriptions())
            .filter_map(|d| description_value(d, "cost"))
            .filter_map(parse_cost)
            .sum()
    }

    /// Records whose provisioning date contains `year` as a substring.
    pub fn group_by_year(&self, year: &str) -> Vec<&AccountRecord> {
        let year = year.trim();
        if year.is_empty() {
            return Vec::new();
        }
        self.registry
            .records()
            .filter(|record| {
                record
                    .descriptions()
                    .iter()
                    .filter_map(|d| description_value(d, "provisioning_date"))
                    .any(|v| v.contains(year))
            })
            .collect()
    }

    /// The record for `id_or_name` and its provisioning date, if known.
    pub fn provisioning_date(&self, id_or_name: &str) -> Option<(&AccountRecord, Option<&str>)> {
        let record = self.lookup(id_or_name)?;
        Some((record, field_value(record, "provisioning_date")))
    }
}
