//! Bedrock knowledge-base connector.
//!
//! Sends each configured query to the knowledge base's `Retrieve` API and
//! hands the returned snippets to the vector-search extractor.
//!
//! ```toml
//! [sources.knowledge_base.primary]
//! knowledge_base_id = "KB12345678"
//! region = "ap-south-1"
//! number_of_results = 100
//! # queries = ["list all AWS account numbers"]
//! # endpoint_url = "http://127.0.0.1:4566"
//! ```
//!
//! Requests are signed with SigV4 for the `bedrock` service.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::aws_sigv4::{self, AwsCredentials, Endpoint, RequestSpec};
use crate::config::KnowledgeBaseSourceConfig;
use crate::extractors::{self, RawInput, Snippet};
use crate::models::Candidate;
use crate::traits::Connector;

pub struct KnowledgeBaseConnector {
    name: String,
    config: KnowledgeBaseSourceConfig,
    credentials: Option<AwsCredentials>,
}

impl KnowledgeBaseConnector {
    /// Credentials are read from the environment on every scan.
    pub fn new(name: String, config: KnowledgeBaseSourceConfig) -> Self {
        Self {
            name,
            config,
            credentials: None,
        }
    }

    pub fn with_credentials(
        name: String,
        config: KnowledgeBaseSourceConfig,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            name,
            config,
            credentials: Some(credentials),
        }
    }
}

#[async_trait]
impl Connector for KnowledgeBaseConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Retrieve account snippets from a Bedrock knowledge base"
    }

    fn connector_type(&self) -> &str {
        "kb"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        let creds = match &self.credentials {
            Some(c) => c.clone(),
            None => AwsCredentials::from_env()?,
        };
        scan_knowledge_base(&self.source_label(), &self.config, &creds).await
    }
}

/// Run every configured query and extract from the union of snippets.
///
/// A snippet returned by several queries is extracted once.
pub async fn scan_knowledge_base(
    label: &str,
    kb_config: &KnowledgeBaseSourceConfig,
    creds: &AwsCredentials,
) -> Result<Vec<Candidate>> {
    let client = reqwest::Client::new();
    let mut snippets: Vec<Snippet> = Vec::new();

    for query in &kb_config.queries {
        let batch = retrieve(&client, kb_config, creds, query).await?;
        tracing::debug!(source = label, query = %query, snippets = batch.len(), "retrieved");
        for snippet in batch {
            if !snippets.contains(&snippet) {
                snippets.push(snippet);
            }
        }
    }

    Ok(extractors::extract(&RawInput::Snippets(snippets), label))
}

fn kb_endpoint(kb_config: &KnowledgeBaseSourceConfig) -> Endpoint {
    match kb_config.endpoint_url {
        Some(ref url) => Endpoint::parse(url),
        None => Endpoint::https(format!(
            "bedrock-agent-runtime.{}.amazonaws.com",
            kb_config.region
        )),
    }
}

/// One signed `Retrieve` call.
pub async fn retrieve(
    client: &reqwest::Client,
    kb_config: &KnowledgeBaseSourceConfig,
    creds: &AwsCredentials,
    query: &str,
) -> Result<Vec<Snippet>> {
    let endpoint = kb_endpoint(kb_config);
    let path = format!(
        "/knowledgebases/{}/retrieve",
        aws_sigv4::uri_encode(&kb_config.knowledge_base_id)
    );
    let body = serde_json::to_vec(&serde_json::json!({
        "retrievalQuery": { "text": query },
        "retrievalConfiguration": {
            "vectorSearchConfiguration": { "numberOfResults": kb_config.number_of_results }
        }
    }))?;

    let signed = aws_sigv4::sign(
        &RequestSpec {
            method: "POST",
            endpoint: &endpoint,
            path: &path,
            query: &[],
            payload: &body,
            region: &kb_config.region,
            service: "bedrock",
        },
        creds,
        Utc::now(),
    );

    let resp = aws_sigv4::apply(client.post(&signed.url), &signed)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to call Retrieve on knowledge base {}",
                kb_config.knowledge_base_id
            )
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!(
            "Bedrock Retrieve failed (HTTP {}): {}",
            status,
            text.chars().take(500).collect::<String>()
        );
    }

    let parsed: RetrieveResponse = resp
        .json()
        .await
        .context("Failed to parse Retrieve response")?;
    Ok(parsed.into_snippets())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
struct RetrievalResult {
    content: Option<RetrievalContent>,
    location: Option<RetrievalLocation>,
}

#[derive(Debug, Deserialize)]
struct RetrievalContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalLocation {
    s3_location: Option<S3Location>,
}

#[derive(Debug, Deserialize)]
struct S3Location {
    uri: Option<String>,
}

impl RetrieveResponse {
    fn into_snippets(self) -> Vec<Snippet> {
        self.retrieval_results
            .into_iter()
            .filter_map(|r| {
                let text = r.content.and_then(|c| c.text)?;
                let locator = r
                    .location
                    .and_then(|l| l.s3_location)
                    .and_then(|s| s.uri);
                Some(Snippet::new(text, locator))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retrieve_response() {
        let json = serde_json::json!({
            "retrievalResults": [
                {
                    "content": { "text": "Account Number: 123456789012" },
                    "location": { "type": "S3", "s3Location": { "uri": "s3://kb/accounts.csv" } },
                    "score": 0.8
                },
                { "content": { "text": "no location 210987654321" } },
                { "location": { "s3Location": { "uri": "s3://kb/empty" } } }
            ]
        });
        let parsed: RetrieveResponse = serde_json::from_value(json).unwrap();
        let snippets = parsed.into_snippets();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].locator.as_deref(), Some("s3://kb/accounts.csv"));
        assert_eq!(snippets[1].locator, None);
    }

    #[test]
    fn endpoint_defaults_to_regional_host() {
        let cfg = KnowledgeBaseSourceConfig {
            knowledge_base_id: "KB1".into(),
            region: "ap-south-1".into(),
            queries: vec!["q".into()],
            number_of_results: 10,
            endpoint_url: None,
        };
        assert_eq!(
            kb_endpoint(&cfg).base_url(),
            "https://bedrock-agent-runtime.ap-south-1.amazonaws.com"
        );
    }
}
