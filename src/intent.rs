//! Free-text intent resolution.
//!
//! An ordered rule list over the lower-cased query; the first rule that
//! matches decides the operation.
//!
//! 1. Remember the first bare 12-digit id, if any.
//! 2. "account" + a digit + an id → lookup.
//! 3. "list" + "account" → list all.
//! 4. A classification label → filter by classification.
//! 5. A status label ("active", then "suspended") → filter by status.
//! 6. A management label → filter by management type.
//! 7. "cost" or "total" → total cost.
//! 8. "provisioning date" / "provision date" + an id → provisioning date.
//! 9. A year token (2019–2025) → accounts provisioned that year.
//! 10. Otherwise → list all.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::account_id::find_bare;
use crate::config::QueryConfig;

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{4})\b").expect("valid year pattern"));

const MIN_YEAR: u32 = 2019;
const MAX_YEAR: u32 = 2025;

/// One store operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Intent {
    Lookup { account_id: String },
    ListAll,
    FilterByField { field: String, value: String },
    TotalCost,
    ProvisioningDate { account_id: String },
    GroupByYear { year: String },
}

/// Labels the resolver matches against.
#[derive(Debug, Clone)]
pub struct IntentRules {
    pub classification_labels: Vec<String>,
    pub status_labels: Vec<String>,
    pub management_labels: Vec<String>,
}

impl IntentRules {
    pub fn from_config(query: &QueryConfig) -> Self {
        Self {
            classification_labels: query.classification_labels.clone(),
            status_labels: query.status_labels.clone(),
            management_labels: query.management_labels.clone(),
        }
    }
}

impl Default for IntentRules {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

fn first_label<'a>(text: &str, labels: &'a [String]) -> Option<&'a String> {
    labels
        .iter()
        .find(|label| text.contains(&label.trim().to_lowercase()))
}

/// First bare 4-digit token within the supported year range.
pub fn year_token(text: &str) -> Option<String> {
    YEAR_TOKEN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|y| {
            y.parse::<u32>()
                .map(|n| (MIN_YEAR..=MAX_YEAR).contains(&n))
                .unwrap_or(false)
        })
        .map(str::to_string)
}

pub fn resolve(text: &str, rules: &IntentRules) -> Intent {
    let lower = text.to_lowercase();
    let account_id = find_bare(text).into_iter().next();

    if let Some(ref id) = account_id {
        if lower.contains("account") && lower.chars().any(|c| c.is_ascii_digit()) {
            return Intent::Lookup {
                account_id: id.clone(),
            };
        }
    }

    if lower.contains("list") && lower.contains("account") {
        return Intent::ListAll;
    }

    if let Some(label) = first_label(&lower, &rules.classification_labels) {
        return Intent::FilterByField {
            field: "classification".to_string(),
            value: label.clone(),
        };
    }

    if let Some(label) = first_label(&lower, &rules.status_labels) {
        return Intent::FilterByField {
            field: "status".to_string(),
            value: label.clone(),
        };
    }

    if let Some(label) = first_label(&lower, &rules.management_labels) {
        return Intent::FilterByField {
            field: "management".to_string(),
            value: label.clone(),
        };
    }

    if lower.contains("cost") || lower.contains("total") {
        return Intent::TotalCost;
    }

    if lower.contains("provisioning date") || lower.contains("provision date") {
        if let Some(id) = account_id {
            return Intent::ProvisioningDate { account_id: id };
        }
    }

    if let Some(year) = year_token(&lower) {
        return Intent::GroupByYear { year };
    }

    Intent::ListAll
}
