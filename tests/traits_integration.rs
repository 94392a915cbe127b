//! Integration tests for the extension traits, the knowledge-base connector
//! against a local mock, and the HTTP server.

use account_harness::aws_sigv4::AwsCredentials;
use account_harness::config::{Config, KnowledgeBaseSourceConfig};
use account_harness::connector_kb::KnowledgeBaseConnector;
use account_harness::merge::RegistryOrigin;
use account_harness::models::{AccountId, Candidate, DescriptionEntry};
use account_harness::refresh::refresh;
use account_harness::server::run_server_with_extensions;
use account_harness::traits::{Connector, ConnectorRegistry, Tool, ToolContext, ToolRegistry};
use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ─── Custom connector and tool ──────────────────────────────────────

/// Rows held in memory, emitted as structured candidates.
struct InMemoryConnector {
    rows: Vec<(String, String)>,
}

impl InMemoryConnector {
    fn new(rows: &[(&str, &str)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    fn name(&self) -> &str {
        "inmemory"
    }

    fn description(&self) -> &str {
        "Accounts held in memory"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(i, (id, name))| {
                let mut fields = BTreeMap::new();
                fields.insert("AWS Account Number".to_string(), id.clone());
                fields.insert("AWS account Name".to_string(), name.clone());
                fields.insert("Total Cost in Indian Rupees".to_string(), "100".to_string());
                Candidate::new(
                    id.clone(),
                    DescriptionEntry::Fields(fields),
                    format!("custom:inmemory#row={}", i + 1),
                )
            })
            .collect())
    }
}

struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        anyhow::bail!("inventory service unreachable")
    }
}

/// Reports how many accounts are published.
struct CountTool;

#[async_trait]
impl Tool for CountTool {
    fn name(&self) -> &str {
        "count_accounts"
    }

    fn description(&self) -> &str {
        "Count published accounts"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let store = ctx.store();
        Ok(json!({
            "count": store.len(),
            "origin": store.origin().as_str(),
            "source_count": ctx.sources().len(),
        }))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let mut config = Config::default();
    config.snapshot.path = tmp.path().join("data/accounts_snapshot.json");
    config.refresh.source_timeout_secs = 5;
    config.server.bind = format!("127.0.0.1:{}", port);
    config
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

#[derive(Clone)]
struct MockKb {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

async fn mock_retrieve(
    State(mock): State<MockKb>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    if mock.fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "internal failure" })),
        );
    }
    assert!(body["retrievalQuery"]["text"].is_string());
    (
        StatusCode::OK,
        Json(json!({
            "retrievalResults": [
                {
                    "content": { "text": "Account Number: 123456789012\nAccount Name: kb-payments\nStatus: ACTIVE" },
                    "location": { "type": "S3", "s3Location": { "uri": "s3://kb-docs/accounts.md" } }
                },
                {
                    "content": { "text": "Shared VPC peers 210987654321 and 333344445555." }
                }
            ]
        })),
    )
}

/// Start a mock Retrieve endpoint; returns its base URL and call counter.
async fn start_mock_kb(fail: bool) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/knowledgebases/{id}/retrieve", post(mock_retrieve))
        .with_state(MockKb {
            calls: calls.clone(),
            fail,
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{}", addr), calls)
}

fn kb_connector(endpoint: String) -> KnowledgeBaseConnector {
    KnowledgeBaseConnector::with_credentials(
        "primary".to_string(),
        KnowledgeBaseSourceConfig {
            knowledge_base_id: "KB12345678".to_string(),
            region: "ap-south-1".to_string(),
            queries: vec![
                "list all AWS account numbers and their owners".to_string(),
                "list all AWS account numbers".to_string(),
            ],
            number_of_results: 100,
            endpoint_url: Some(endpoint),
        },
        AwsCredentials::new("AKIDEXAMPLE", "secret", None),
    )
}

fn id(s: &str) -> AccountId {
    AccountId::normalize(s).unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

/// Knowledge-base snippets become candidates; identical snippets returned
/// by both default queries are extracted once.
#[tokio::test]
async fn test_knowledge_base_connector_against_mock() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let (endpoint, calls) = start_mock_kb(false).await;

    let mut connectors = ConnectorRegistry::new();
    connectors.register(Box::new(kb_connector(endpoint)));

    let (store, report) = refresh(&cfg, &connectors, None).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.origin, RegistryOrigin::Fresh);
    assert_eq!(report.sources[0].source, "kb:primary");
    assert!(report.sources[0].error.is_none(), "{:?}", report.sources[0]);
    assert_eq!(report.sources[0].candidates, 3);
    assert_eq!(store.len(), 3);

    let record = store.registry().get(&id("123456789012")).unwrap();
    assert_eq!(record.descriptions().len(), 1);
    assert_eq!(
        record.descriptions()[0].field("AWS account Name"),
        Some("kb-payments")
    );
    assert_eq!(record.sources()[0], "kb:primary:s3://kb-docs/accounts.md");

    let peer = store.registry().get(&id("333344445555")).unwrap();
    assert!(peer.descriptions()[0].lines().is_some());
    assert_eq!(peer.sources()[0], "kb:primary:knowledge-base");
}

/// A failing remote source is reported but does not block other sources.
#[tokio::test]
async fn test_failing_knowledge_base_does_not_block_refresh() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let (endpoint, _) = start_mock_kb(true).await;

    let mut connectors = ConnectorRegistry::new();
    connectors.register(Box::new(kb_connector(endpoint)));
    connectors.register(Box::new(FailingConnector));
    connectors.register(Box::new(InMemoryConnector::new(&[(
        "123456789012",
        "payments",
    )])));

    let (store, report) = refresh(&cfg, &connectors, None).await;
    assert_eq!(store.len(), 1);
    assert!(report.sources[0]
        .error
        .as_deref()
        .unwrap()
        .contains("HTTP 500"));
    assert!(report.sources[1]
        .error
        .as_deref()
        .unwrap()
        .contains("inventory service unreachable"));
    assert!(report.sources[2].error.is_none());
    assert!(cfg.snapshot.path.exists());
}

/// The server serves built-in query tools, custom tools, free text, and an
/// explicit refresh over the same published store.
#[tokio::test]
async fn test_http_server_tools_and_queries() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, port);

    let mut connectors = ConnectorRegistry::new();
    connectors.register(Box::new(InMemoryConnector::new(&[
        ("123456789012", "payments"),
        ("210987654321", "search"),
    ])));

    let mut tools = ToolRegistry::new();
    tools.register(Box::new(CountTool));
    let tools = Arc::new(tools);

    let server_handle = tokio::spawn(async move {
        run_server_with_extensions(&cfg, tools, connectors)
            .await
            .ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    // Health reports the published account count.
    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accounts"], 2);

    // Tool list has built-ins and the custom tool.
    let body: Value = client
        .get(format!("{}/tools/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = body["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "get_account",
        "list_accounts",
        "get_accounts_by_classification",
        "get_accounts_by_status",
        "get_accounts_by_management",
        "get_total_cost",
        "get_account_provisioning_date",
        "get_accounts_by_year",
        "resolve_free_text",
        "sources",
        "count_accounts",
    ] {
        assert!(names.contains(&expected), "missing {} in {:?}", expected, names);
    }
    let custom = tools.iter().find(|t| t["name"] == "count_accounts").unwrap();
    assert_eq!(custom["builtin"], false);

    // Known account by name.
    let resp = client
        .post(format!("{}/tools/get_account", base))
        .json(&json!({ "account_id": "search" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["type"], "account_info");
    assert_eq!(body["result"]["account"]["account_number"], "210987654321");

    // Unknown account is a not_found payload, not an HTTP error.
    let resp = client
        .post(format!("{}/tools/get_account", base))
        .json(&json!({ "account_id": "999999999999" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["type"], "not_found");

    // Missing argument is a 400 carrying the prompt.
    let resp = client
        .post(format!("{}/tools/get_accounts_by_classification", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(
        body["error"]["message"],
        "Please provide a classification to look up."
    );

    // Wrong parameter type is a validation error.
    let resp = client
        .post(format!("{}/tools/get_account", base))
        .json(&json!({ "account_id": ["123456789012"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Custom tool sees the same store.
    let body: Value = client
        .post(format!("{}/tools/count_accounts", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["count"], 2);
    assert_eq!(body["result"]["origin"], "fresh");

    // Free text.
    let body: Value = client
        .post(format!("{}/query", base))
        .json(&json!({ "query": "what is the total cost" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["intent"]["operation"], "total_cost");
    assert_eq!(body["result"]["total_cost"], 200.0);

    let resp = client
        .post(format!("{}/query", base))
        .json(&json!({ "query": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Explicit refresh.
    let body: Value = client
        .post(format!("{}/refresh", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["origin"], "fresh");
    assert_eq!(body["accounts"], 2);
    assert_eq!(body["sources"][0]["source"], "custom:inmemory");

    // Unknown tool.
    let resp = client
        .post(format!("{}/tools/nonexistent", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    server_handle.abort();
}

/// With nothing to read and no snapshot, every query answers "no data".
#[tokio::test]
async fn test_server_without_data_answers_no_data() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, port);

    let server_handle = tokio::spawn(async move {
        run_server_with_extensions(&cfg, Arc::new(ToolRegistry::new()), ConnectorRegistry::new())
            .await
            .ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("http://127.0.0.1:{}/tools/list_accounts", port))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["type"], "no_data");

    server_handle.abort();
}
