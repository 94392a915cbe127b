//! Response rendering.
//!
//! Every payload is a JSON object with a `type` tag and a `message` holding
//! the text rendering. Lists in `accounts` are always complete; only the
//! text is capped at the display limit.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::digits::render_spoken;
use crate::models::{AccountRecord, DescriptionEntry};
use crate::store::field_value;

const RULE: &str = "=======================";

/// One account as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub account_number: String,
    pub account_number_reading: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<String>,
    pub descriptions: Vec<DescriptionEntry>,
    pub sources: Vec<String>,
}

impl AccountView {
    pub fn from_record(record: &AccountRecord) -> Self {
        let get = |field: &str| field_value(record, field).map(|v| v.trim().to_string());
        Self {
            account_number: record.id().to_string(),
            account_number_reading: render_spoken(record.id().as_str()),
            account_name: get("name"),
            status: get("status"),
            classification: get("classification"),
            management_type: get("management"),
            provisioning_date: get("provisioning_date"),
            total_cost: get("cost"),
            descriptions: record.descriptions().to_vec(),
            sources: record.sources().to_vec(),
        }
    }

    fn number_line(&self) -> String {
        format!(
            "Account Number: {} (read as: {})",
            self.account_number, self.account_number_reading
        )
    }
}

/// Which fields a list entry shows after the number and name.
#[derive(Debug, Clone, Copy)]
enum Detail {
    Status,
    Classification,
    StatusAndClassification,
    ProvisioningDate,
}

fn push_line(out: &mut String, label: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.push_str(&format!("{}: {}\n", label, v));
    }
}

fn header(title: &str) -> String {
    format!("{}\n{}\n\n", title, RULE)
}

fn detail_text(view: &AccountView) -> String {
    let mut out = String::new();
    out.push_str(&view.number_line());
    out.push('\n');
    push_line(&mut out, "Account Name", &view.account_name);
    push_line(&mut out, "Provisioning Date", &view.provisioning_date);
    push_line(&mut out, "Status", &view.status);
    push_line(&mut out, "Classification", &view.classification);
    push_line(&mut out, "Management Type", &view.management_type);
    if let Some(ref cost) = view.total_cost {
        out.push_str(&format!("Total Cost: {} Indian Rupees\n", cost));
    }

    let structured = view.descriptions.iter().any(|d| d.fields().is_some());
    if !structured {
        if let Some(lines) = view.descriptions.iter().find_map(|d| d.lines()) {
            out.push_str("Context:\n");
            for line in lines {
                out.push_str(&format!("  {}\n", line));
            }
        }
    }

    out.push_str(&format!("Sources: {}\n", view.sources.join(", ")));
    out
}

fn list_entry(view: &AccountView, detail: Detail) -> String {
    let mut out = String::new();
    out.push_str(&view.number_line());
    out.push('\n');
    push_line(&mut out, "Account Name", &view.account_name);
    match detail {
        Detail::Status => push_line(&mut out, "Status", &view.status),
        Detail::Classification => push_line(&mut out, "Classification", &view.classification),
        Detail::StatusAndClassification => {
            push_line(&mut out, "Status", &view.status);
            push_line(&mut out, "Classification", &view.classification);
        }
        Detail::ProvisioningDate => {
            push_line(&mut out, "Provisioning Date", &view.provisioning_date)
        }
    }
    out.push('\n');
    out
}

/// `Found N accounts:` followed by at most `limit` entries and a remainder
/// line when capped.
fn list_text(
    title: &str,
    found_line: &str,
    views: &[AccountView],
    limit: usize,
    detail: Detail,
) -> String {
    let mut out = header(title);
    out.push_str(found_line);
    out.push_str("\n\n");
    for view in views.iter().take(limit) {
        out.push_str(&list_entry(view, detail));
    }
    if views.len() > limit {
        out.push_str(&format!("... and {} more accounts.", views.len() - limit));
    }
    out.trim_end().to_string()
}

fn list_payload(
    kind: &str,
    extra: Map<String, Value>,
    views: Vec<AccountView>,
    message: String,
) -> Value {
    let mut obj = Map::new();
    obj.insert("type".into(), json!(kind));
    obj.extend(extra);
    obj.insert("count".into(), json!(views.len()));
    obj.insert("accounts".into(), json!(views));
    obj.insert("message".into(), json!(message));
    Value::Object(obj)
}

fn views(records: &[&AccountRecord]) -> Vec<AccountView> {
    records.iter().map(|r| AccountView::from_record(r)).collect()
}

pub fn account_info(record: &AccountRecord) -> Value {
    let view = AccountView::from_record(record);
    let message = format!("{}{}", header("AWS Account Information:"), detail_text(&view));
    json!({
        "type": "account_info",
        "account": view,
        "message": message.trim_end(),
    })
}

pub fn all_accounts(records: &[&AccountRecord], limit: usize) -> Value {
    let views = views(records);
    let message = list_text(
        "AWS Account Information:",
        &format!("Found {} accounts:", views.len()),
        &views,
        limit,
        Detail::StatusAndClassification,
    );
    list_payload("all_accounts", Map::new(), views, message)
}

fn filtered(
    kind: &str,
    key: &str,
    what: &str,
    value: &str,
    records: &[&AccountRecord],
    limit: usize,
    detail: Detail,
) -> Value {
    let views = views(records);
    let message = if views.is_empty() {
        format!("No accounts found with {} {}.", what, value)
    } else {
        list_text(
            &format!("AWS Accounts with {} {}:", title_case(what), value),
            &format!("Found {} accounts:", views.len()),
            &views,
            limit,
            detail,
        )
    };
    let mut extra = Map::new();
    extra.insert(key.into(), json!(value));
    list_payload(kind, extra, views, message)
}

pub fn classification_info(label: &str, records: &[&AccountRecord], limit: usize) -> Value {
    filtered(
        "classification_info",
        "classification",
        "classification",
        label,
        records,
        limit,
        Detail::Status,
    )
}

pub fn status_info(status: &str, records: &[&AccountRecord], limit: usize) -> Value {
    filtered(
        "status_info",
        "status",
        "status",
        status,
        records,
        limit,
        Detail::Classification,
    )
}

pub fn management_info(management: &str, records: &[&AccountRecord], limit: usize) -> Value {
    filtered(
        "management_info",
        "management_type",
        "management type",
        management,
        records,
        limit,
        Detail::StatusAndClassification,
    )
}

pub fn year_info(year: &str, records: &[&AccountRecord], limit: usize) -> Value {
    let views = views(records);
    let message = if views.is_empty() {
        format!("No accounts were provisioned in the year {}.", year)
    } else {
        list_text(
            &format!("AWS Accounts Provisioned in {}:", year),
            &format!("Found {} accounts provisioned in {}:", views.len(), year),
            &views,
            limit,
            Detail::ProvisioningDate,
        )
    };
    let mut extra = Map::new();
    extra.insert("year".into(), json!(year));
    list_payload("year_info", extra, views, message)
}

pub fn total_cost(total: f64) -> Value {
    let amount = format_amount(total);
    let message = format!(
        "{}The total cost of all AWS accounts is {} Indian Rupees.",
        header("Total Cost of AWS Accounts:"),
        amount
    );
    json!({
        "type": "cost_info",
        "total_cost": total,
        "currency": "INR",
        "message": message,
    })
}

/// Cost of one account. `total_cost` is null when no description carries one.
pub fn account_cost(record: &AccountRecord) -> Value {
    let view = AccountView::from_record(record);
    let mut message = header("AWS Account Cost Information:");
    message.push_str(&view.number_line());
    message.push('\n');
    push_line(&mut message, "Account Name", &view.account_name);
    match view.total_cost {
        Some(ref cost) => message.push_str(&format!("Total Cost: {} Indian Rupees", cost)),
        None => message.push_str("No cost information is recorded for this account."),
    }
    json!({
        "type": "cost_info",
        "account_number": view.account_number,
        "account_number_reading": view.account_number_reading,
        "total_cost": view.total_cost,
        "currency": "INR",
        "message": message,
    })
}

pub fn provisioning_date_info(record: &AccountRecord, date: Option<&str>) -> Value {
    let view = AccountView::from_record(record);
    let mut message = header("AWS Account Provisioning Date:");
    message.push_str(&view.number_line());
    message.push('\n');
    push_line(&mut message, "Account Name", &view.account_name);
    match date {
        Some(d) => message.push_str(&format!("Provisioning Date: {}", d.trim())),
        None => message.push_str("No provisioning date is recorded for this account."),
    }
    json!({
        "type": "provisioning_date_info",
        "account_number": view.account_number,
        "account_number_reading": view.account_number_reading,
        "account_name": view.account_name,
        "provisioning_date": date.map(str::trim),
        "message": message,
    })
}

pub fn not_found(query: &str) -> Value {
    json!({
        "type": "not_found",
        "query": query,
        "message": format!("No AWS account found matching {}.", query),
    })
}

pub fn no_data() -> Value {
    json!({
        "type": "no_data",
        "message": "No account data is available. No source could be read and no snapshot exists.",
    })
}

/// Whole amounts print without decimals, others with two.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The text rendering carried in a payload's `message`.
pub fn message(payload: &Value) -> &str {
    payload["message"].as_str().unwrap_or_default()
}
