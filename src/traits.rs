//! Extension traits for custom connectors and tools.
//!
//! Built-in connectors (table, filesystem, S3, knowledge base) and built-in
//! query tools are registered through the same registries as user-supplied
//! Rust extensions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           ConnectorRegistry              │
//! │  ┌──────────────────┐ ┌──────────────┐   │
//! │  │ Built-in         │ │  Custom      │   │
//! │  │ table/fs/s3/kb   │ │  (Rust)      │   │
//! │  └──────────────────┘ └──────────────┘   │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        refresh() → merge → AccountStore
//! ```
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────────┐ ┌──────────────┐   │
//! │  │ Built-in         │ │  Custom      │   │
//! │  │ get_account ...  │ │  (Rust)      │   │
//! │  │ sources          │ │  Tools       │   │
//! │  └──────────────────┘ └──────────────┘   │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          run_server() → HTTP API
//! ```
//!
//! # Usage
//!
//! ```rust
//! use account_harness::traits::{ConnectorRegistry, ToolRegistry};
//!
//! let mut connectors = ConnectorRegistry::new();
//! // connectors.register(Box::new(MyConnector::new()));
//!
//! let mut tools = ToolRegistry::with_builtins();
//! // tools.register(Box::new(MyTool::new()));
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::models::Candidate;
use crate::query::{self, Operation, QueryOutcome, QueryRequest};
use crate::refresh::SnapshotHandle;
use crate::sources::{get_sources, SourceStatus};
use crate::store::AccountStore;

// ═══════════════════════════════════════════════════════════════════════
// Connector Trait
// ═══════════════════════════════════════════════════════════════════════

/// A data source that yields account candidates.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use account_harness::models::{Candidate, DescriptionEntry};
/// use account_harness::traits::Connector;
///
/// pub struct CmdbConnector;
///
/// #[async_trait]
/// impl Connector for CmdbConnector {
///     fn name(&self) -> &str { "cmdb" }
///     fn description(&self) -> &str { "Accounts from the CMDB export" }
///
///     async fn scan(&self) -> Result<Vec<Candidate>> {
///         Ok(vec![Candidate::new(
///             "123456789012",
///             DescriptionEntry::Lines(vec!["owned by platform".into()]),
///             "custom:cmdb",
///         )])
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name (e.g. `"inventory"`).
    fn name(&self) -> &str;

    /// One-line description, shown by `acct sources`.
    fn description(&self) -> &str;

    /// Type identifier: `"table"`, `"fs"`, `"s3"`, `"kb"`, or `"custom"`.
    fn connector_type(&self) -> &str {
        "custom"
    }

    /// Label used in provenance and refresh reports: `"{type}:{name}"`.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    /// Read the source and return every candidate it yields.
    ///
    /// An `Err` marks the whole source as unavailable for this refresh
    /// cycle; other sources are unaffected.
    async fn scan(&self) -> Result<Vec<Candidate>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool exposed via `GET /tools/list` and `POST /tools/{name}`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, lowercase with underscores.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Built-in tools are marked `"builtin": true` in the tool list.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for parameters (`type: "object"` with `properties`).
    fn parameters_schema(&self) -> Value;

    /// Execute with parameters already checked by [`validate_params`].
    ///
    /// The returned value is wrapped in `{ "result": ... }`. An error whose
    /// message starts with [`USER_ERROR_PREFIX`] is reported as a 400.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Prefix marking a tool error as the caller's fault.
pub const USER_ERROR_PREFIX: &str = "invalid request: ";

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Check `params` against a tool's JSON Schema: required fields, types,
/// and enums. Missing optional fields with a `default` get it injected.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be a JSON object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            // Years and ids are often sent as JSON numbers.
            let coercible = expected == "string" && value.is_number();
            if !type_ok && !coercible {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool can see while executing: the config and the currently
/// published store.
pub struct ToolContext {
    config: Arc<Config>,
    snapshot: SnapshotHandle,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, snapshot: SnapshotHandle) -> Self {
        Self { config, snapshot }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The published store at the time of the call. Stays valid even if a
    /// refresh publishes a newer one meanwhile.
    pub fn store(&self) -> Arc<AccountStore> {
        self.snapshot.current()
    }

    pub fn sources(&self) -> Vec<SourceStatus> {
        get_sources(&self.config)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// One query operation exposed as a tool.
pub struct QueryTool {
    operation: Operation,
}

impl QueryTool {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        self.operation.name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        self.operation.parameters_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let store = ctx.store();
        let request = QueryRequest::from_params(self.operation, &params);
        match query::execute(&store, &ctx.config.query, &request) {
            QueryOutcome::Success(payload) => Ok(payload),
            QueryOutcome::UserError(msg) => bail!("{}{}", USER_ERROR_PREFIX, msg),
        }
    }
}

/// Built-in sources listing tool.
pub struct SourcesTool;

#[async_trait]
impl Tool for SourcesTool {
    fn name(&self) -> &str {
        "sources"
    }

    fn description(&self) -> &str {
        "List configured account sources"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(json!({ "sources": ctx.sources() }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registries
// ═══════════════════════════════════════════════════════════════════════

/// Registry for connectors (built-in and custom).
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// Every source declared in the config, in a fixed order: tables,
    /// filesystems, S3 prefixes, knowledge bases.
    pub fn from_config(config: &Config) -> Self {
        use crate::connector_fs::FilesystemConnector;
        use crate::connector_kb::KnowledgeBaseConnector;
        use crate::connector_s3::S3Connector;
        use crate::connector_table::TableConnector;

        let mut registry = Self::new();

        for (name, cfg) in &config.sources.table {
            registry.register(Box::new(TableConnector::new(name.clone(), cfg.clone())));
        }
        for (name, cfg) in &config.sources.filesystem {
            registry.register(Box::new(FilesystemConnector::new(
                name.clone(),
                cfg.clone(),
            )));
        }
        for (name, cfg) in &config.sources.s3 {
            registry.register(Box::new(S3Connector::new(name.clone(), cfg.clone())));
        }
        for (name, cfg) in &config.sources.knowledge_base {
            registry.register(Box::new(KnowledgeBaseConnector::new(
                name.clone(),
                cfg.clone(),
            )));
        }

        registry
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Box<dyn Connector>] {
        &self.connectors
    }

    /// Find a specific connector by type and name.
    pub fn find(&self, connector_type: &str, name: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.connector_type() == connector_type && c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry for tools (built-in and custom).
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry with one tool per query operation plus `sources`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for op in Operation::ALL {
            registry.register(Box::new(QueryTool::new(op)));
        }
        registry.register(Box::new(SourcesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
