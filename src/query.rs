//! Query surface: typed requests, a tagged outcome, and the CLI entry points.
//!
//! Every operation either succeeds with a payload from [`crate::format`] or
//! reports a [`QueryOutcome::UserError`] for a missing argument. "Not found"
//! and "no data" are successful payloads, never errors.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::account_id::AccountId;
use crate::config::{Config, QueryConfig};
use crate::format;
use crate::intent::{self, Intent, IntentRules};
use crate::merge::{self, RegistryOrigin};
use crate::store::AccountStore;

/// Every named operation. Names double as tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetAccount,
    ListAccounts,
    GetAccountsByClassification,
    GetAccountsByStatus,
    GetAccountsByManagement,
    GetTotalCost,
    GetAccountCost,
    GetAccountProvisioningDate,
    GetAccountsByYear,
    ResolveFreeText,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::GetAccount,
        Operation::ListAccounts,
        Operation::GetAccountsByClassification,
        Operation::GetAccountsByStatus,
        Operation::GetAccountsByManagement,
        Operation::GetTotalCost,
        Operation::GetAccountCost,
        Operation::GetAccountProvisioningDate,
        Operation::GetAccountsByYear,
        Operation::ResolveFreeText,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetAccount => "get_account",
            Operation::ListAccounts => "list_accounts",
            Operation::GetAccountsByClassification => "get_accounts_by_classification",
            Operation::GetAccountsByStatus => "get_accounts_by_status",
            Operation::GetAccountsByManagement => "get_accounts_by_management",
            Operation::GetTotalCost => "get_total_cost",
            Operation::GetAccountCost => "get_account_cost",
            Operation::GetAccountProvisioningDate => "get_account_provisioning_date",
            Operation::GetAccountsByYear => "get_accounts_by_year",
            Operation::ResolveFreeText => "resolve_free_text",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::GetAccount => "Get information about a specific AWS account by ID or name.",
            Operation::ListAccounts => "List all AWS accounts.",
            Operation::GetAccountsByClassification => "Get AWS accounts by classification.",
            Operation::GetAccountsByStatus => "Get AWS accounts by status (ACTIVE or SUSPENDED).",
            Operation::GetAccountsByManagement => "Get AWS accounts by management type.",
            Operation::GetTotalCost => "Get total cost of all AWS accounts.",
            Operation::GetAccountCost => "Get the cost of a specific AWS account.",
            Operation::GetAccountProvisioningDate => {
                "Get the provisioning date of a specific AWS account."
            }
            Operation::GetAccountsByYear => "Get AWS accounts provisioned in a specific year.",
            Operation::ResolveFreeText => "Answer a free-text question about AWS accounts.",
        }
    }

    /// JSON Schema for the operation's parameters. Arguments are optional in
    /// the schema; a missing one yields a user-facing prompt instead of a
    /// validation error.
    pub fn parameters_schema(&self) -> Value {
        let (arg, desc) = match self.argument() {
            Some(pair) => pair,
            None => return json!({ "type": "object", "properties": {} }),
        };
        json!({
            "type": "object",
            "properties": {
                arg: { "type": "string", "description": desc }
            }
        })
    }

    fn argument(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Operation::GetAccount
            | Operation::GetAccountCost
            | Operation::GetAccountProvisioningDate => {
                Some(("account_id", "AWS account ID (12 digits) or account name"))
            }
            Operation::GetAccountsByClassification => {
                Some(("classification", "Classification label, e.g. class-1"))
            }
            Operation::GetAccountsByStatus => Some(("status", "ACTIVE or SUSPENDED")),
            Operation::GetAccountsByManagement => {
                Some(("management_type", "managed services or self service"))
            }
            Operation::GetAccountsByYear => Some(("year", "Four-digit year, e.g. 2021")),
            Operation::ResolveFreeText => Some(("query", "Free-text question")),
            Operation::ListAccounts | Operation::GetTotalCost => None,
        }
    }

    fn missing_argument_prompt(&self) -> &'static str {
        match self {
            Operation::GetAccount
            | Operation::GetAccountCost
            | Operation::GetAccountProvisioningDate => {
                "Please provide an AWS account ID or name to look up."
            }
            Operation::GetAccountsByClassification => "Please provide a classification to look up.",
            Operation::GetAccountsByStatus => {
                "Please provide a status (ACTIVE or SUSPENDED) to look up."
            }
            Operation::GetAccountsByManagement => {
                "Please provide a management type (managed services or self service) to look up."
            }
            Operation::GetAccountsByYear => {
                "Please provide a year to look up accounts provisioned in that year."
            }
            Operation::ResolveFreeText => "Please provide a question to answer.",
            Operation::ListAccounts | Operation::GetTotalCost => "",
        }
    }
}

/// An operation plus its (possibly missing) argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub operation: Operation,
    pub argument: Option<String>,
}

impl QueryRequest {
    pub fn new(operation: Operation, argument: Option<String>) -> Self {
        Self {
            operation,
            argument,
        }
    }

    /// Read the operation's argument from a JSON object. Blank strings count
    /// as missing; numbers are accepted and stringified.
    pub fn from_params(operation: Operation, params: &Value) -> Self {
        let argument = operation.argument().and_then(|(name, _)| {
            match params.get(name) {
                Some(Value::String(s)) => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
            .filter(|s| !s.is_empty())
        });
        Self::new(operation, argument)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum QueryOutcome {
    Success(Value),
    UserError(String),
}

impl QueryOutcome {
    /// Text for display: the payload's message or the prompt.
    pub fn message(&self) -> &str {
        match self {
            QueryOutcome::Success(payload) => format::message(payload),
            QueryOutcome::UserError(msg) => msg,
        }
    }
}

/// Lookup that also accepts hyphenated or spaced ids.
fn find_account<'a>(
    store: &'a AccountStore,
    id_or_name: &str,
) -> Option<&'a crate::models::AccountRecord> {
    store.lookup(id_or_name).or_else(|| {
        let looks_numeric = id_or_name
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == ' ');
        if !looks_numeric {
            return None;
        }
        AccountId::normalize(id_or_name).and_then(|id| store.lookup(id.as_str()))
    })
}

/// Run one store operation.
pub fn run_intent(store: &AccountStore, config: &QueryConfig, intent: &Intent) -> Value {
    if store.is_empty() {
        return format::no_data();
    }
    let limit = config.display_limit;
    match intent {
        Intent::Lookup { account_id } => match find_account(store, account_id) {
            Some(record) => format::account_info(record),
            None => format::not_found(account_id),
        },
        Intent::ListAll => format::all_accounts(&store.list_all(), limit),
        Intent::FilterByField { field, value } => {
            let records = store.filter_by_field(field, value);
            match field.as_str() {
                "classification" => format::classification_info(value, &records, limit),
                "status" => format::status_info(value, &records, limit),
                "management" => format::management_info(value, &records, limit),
                _ => format::all_accounts(&records, limit),
            }
        }
        Intent::TotalCost => format::total_cost(store.total_cost()),
        Intent::ProvisioningDate { account_id } => match find_account(store, account_id) {
            Some(record) => format::provisioning_date_info(
                record,
                crate::store::field_value(record, "provisioning_date"),
            ),
            None => format::not_found(account_id),
        },
        Intent::GroupByYear { year } => format::year_info(year, &store.group_by_year(year), limit),
    }
}

pub fn execute(store: &AccountStore, config: &QueryConfig, request: &QueryRequest) -> QueryOutcome {
    let op = request.operation;
    let arg = match (op.argument(), &request.argument) {
        (Some(_), None) => return QueryOutcome::UserError(op.missing_argument_prompt().to_string()),
        (_, arg) => arg.clone().unwrap_or_default(),
    };

    let intent = match op {
        Operation::GetAccount => Intent::Lookup { account_id: arg },
        Operation::ListAccounts => Intent::ListAll,
        Operation::GetAccountsByClassification => Intent::FilterByField {
            field: "classification".into(),
            value: arg,
        },
        Operation::GetAccountsByStatus => Intent::FilterByField {
            field: "status".into(),
            value: arg,
        },
        Operation::GetAccountsByManagement => Intent::FilterByField {
            field: "management".into(),
            value: arg,
        },
        Operation::GetTotalCost => Intent::TotalCost,
        Operation::GetAccountProvisioningDate => Intent::ProvisioningDate { account_id: arg },
        Operation::GetAccountsByYear => Intent::GroupByYear { year: arg },
        Operation::GetAccountCost => {
            if store.is_empty() {
                return QueryOutcome::Success(format::no_data());
            }
            return QueryOutcome::Success(match find_account(store, &arg) {
                Some(record) => format::account_cost(record),
                None => format::not_found(&arg),
            });
        }
        Operation::ResolveFreeText => {
            let (_, outcome) = resolve_free_text(store, config, &arg);
            return outcome;
        }
    };
    QueryOutcome::Success(run_intent(store, config, &intent))
}

/// Resolve free text and run the resulting operation.
pub fn resolve_free_text(
    store: &AccountStore,
    config: &QueryConfig,
    text: &str,
) -> (Intent, QueryOutcome) {
    let intent = intent::resolve(text, &IntentRules::from_config(config));
    tracing::debug!(?intent, "resolved free-text query");
    let payload = run_intent(store, config, &intent);
    (intent, QueryOutcome::Success(payload))
}

// ============ CLI ============

/// Store built from the persisted snapshot, for one-shot CLI queries.
pub fn load_store(config: &Config) -> Result<AccountStore> {
    Ok(match merge::load_snapshot(&config.snapshot.path)? {
        Some(registry) if !registry.is_empty() => {
            AccountStore::new(registry, RegistryOrigin::Snapshot)
        }
        _ => AccountStore::empty(),
    })
}

fn print_outcome(outcome: &QueryOutcome, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        println!("{}", outcome.message());
    }
    Ok(())
}

pub fn run_get(config: &Config, id_or_name: &str, as_json: bool) -> Result<()> {
    let store = load_store(config)?;
    let argument = Some(id_or_name.trim().to_string()).filter(|s| !s.is_empty());
    let request = QueryRequest::new(Operation::GetAccount, argument);
    print_outcome(&execute(&store, &config.query, &request), as_json)
}

pub fn run_list(config: &Config, as_json: bool) -> Result<()> {
    let store = load_store(config)?;
    let request = QueryRequest::new(Operation::ListAccounts, None);
    print_outcome(&execute(&store, &config.query, &request), as_json)
}

pub fn run_query(config: &Config, text: &str, as_json: bool) -> Result<()> {
    let store = load_store(config)?;
    let (intent, outcome) = resolve_free_text(&store, &config.query, text);
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "intent": intent, "result": outcome }))?
        );
        return Ok(());
    }
    print_outcome(&outcome, false)
}
