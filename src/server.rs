//! HTTP server.
//!
//! Exposes every query operation as a tool, plus a free-text endpoint and
//! an explicit refresh trigger. Built-in and custom Rust tools share one
//! dispatch path through `POST /tools/{name}`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and published account count |
//! | `GET`  | `/tools/list` | All registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `POST` | `/query` | Resolve free text: `{ "query": "..." }` |
//! | `POST` | `/refresh` | Run a refresh cycle now and return its report |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Please provide a classification to look up." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404, unknown tool),
//! `internal` (500). An unknown account is not an error; it is a
//! `not_found` payload inside a 200 result.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::query;
use crate::refresh::{self, RefreshReport, SnapshotHandle};
use crate::traits::{
    validate_params, ConnectorRegistry, ToolContext, ToolInfo, ToolRegistry, USER_ERROR_PREFIX,
};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Built-in tools.
    tools: Arc<ToolRegistry>,
    /// Custom tools, consulted after the built-ins.
    extras: Arc<ToolRegistry>,
    connectors: Arc<ConnectorRegistry>,
    snapshot: SnapshotHandle,
}

/// Start the server with the sources declared in `config`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_extensions(
        config,
        Arc::new(ToolRegistry::new()),
        ConnectorRegistry::from_config(config),
    )
    .await
}

/// Start the server with custom tools and an explicit connector set.
///
/// Performs one refresh before binding, then refreshes every
/// `[refresh].interval_secs` seconds when that is non-zero.
///
/// ```rust,no_run
/// use account_harness::server::run_server_with_extensions;
/// use account_harness::traits::{ConnectorRegistry, ToolRegistry};
/// use std::sync::Arc;
///
/// # async fn example(config: &account_harness::config::Config) -> anyhow::Result<()> {
/// let mut connectors = ConnectorRegistry::from_config(config);
/// // connectors.register(Box::new(MyConnector::new()));
/// run_server_with_extensions(config, Arc::new(ToolRegistry::new()), connectors).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with_extensions(
    config: &Config,
    extra_tools: Arc<ToolRegistry>,
    connectors: ConnectorRegistry,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());
    let connectors = Arc::new(connectors);
    let tools = Arc::new(ToolRegistry::with_builtins());

    let snapshot = SnapshotHandle::empty();
    let report = snapshot.refresh_now(&config, &connectors).await;
    tracing::info!(
        origin = report.origin.as_str(),
        accounts = report.accounts,
        sources = report.sources.len(),
        "initial refresh"
    );

    if config.refresh.interval_secs > 0 {
        refresh::spawn_periodic(
            config.clone(),
            connectors.clone(),
            snapshot.clone(),
            Duration::from_secs(config.refresh.interval_secs),
        );
    }

    for t in extra_tools.tools() {
        tracing::info!(tool = t.name(), "registered custom tool");
    }

    let state = AppState {
        config,
        tools,
        extras: extra_tools,
        connectors,
        snapshot,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/query", post(handle_query))
        .route("/refresh", post(handle_refresh))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Account server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// User errors keep their prompt verbatim; anything else is internal.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    match msg.strip_prefix(USER_ERROR_PREFIX) {
        Some(prompt) => bad_request(prompt),
        None => {
            tracing::error!(tool = tool_name, error = %format!("{:#}", err), "tool failed");
            internal(format!("{}: {}", tool_name, msg))
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    accounts: usize,
    origin: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.snapshot.current();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        accounts: store.len(),
        origin: store.origin().as_str(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .chain(state.extras.tools())
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .or_else(|| state.extras.find(&name))
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.config.clone(), state.snapshot.clone());
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(json!({ "result": result })))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryBody {
    query: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Value>, AppError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let store = state.snapshot.current();
    let (intent, outcome) = query::resolve_free_text(&store, &state.config.query, &body.query);
    match outcome {
        query::QueryOutcome::Success(result) => Ok(Json(json!({
            "intent": intent,
            "result": result,
        }))),
        query::QueryOutcome::UserError(msg) => Err(bad_request(msg)),
    }
}

// ============ POST /refresh ============

async fn handle_refresh(State(state): State<AppState>) -> Json<RefreshReport> {
    let report = state
        .snapshot
        .refresh_now(&state.config, &state.connectors)
        .await;
    Json(report)
}
