//! Amazon S3 connector.
//!
//! Lists and downloads objects from an S3 bucket using the S3 REST API with
//! AWS Signature V4 authentication, then extracts candidates from each
//! object by extension (tabular for `.csv`/`.xlsx`, document text for the
//! rest). Pagination, glob filtering on keys relative to `prefix`, and
//! custom endpoints for S3-compatible services are supported.
//!
//! # Configuration
//!
//! ```toml
//! [sources.s3.inventory]
//! bucket = "acme-accounts"
//! prefix = "exports/"
//! region = "ap-south-1"
//! include_globs = ["**/*.csv", "**/*.pdf"]
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! Credentials are read from the environment; see [`crate::aws_sigv4`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::aws_sigv4::{self, AwsCredentials, Endpoint, RequestSpec};
use crate::config::S3SourceConfig;
use crate::connector_fs::build_globset;
use crate::extractors;
use crate::models::Candidate;
use crate::traits::Connector;

pub struct S3Connector {
    name: String,
    config: S3SourceConfig,
}

impl S3Connector {
    pub fn new(name: String, config: S3SourceConfig) -> Self {
        Self { name, config }
    }
}

#[async_trait]
impl Connector for S3Connector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Extract account ids from objects in an S3 bucket"
    }

    fn connector_type(&self) -> &str {
        "s3"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        let creds = AwsCredentials::from_env()?;
        scan_s3(&self.source_label(), &self.config, &creds).await
    }
}

/// Scan an S3 bucket and extract candidates from every matching object.
///
/// Listing failures fail the whole source. A single object that cannot be
/// downloaded or decoded is logged and skipped.
pub async fn scan_s3(
    label: &str,
    s3_config: &S3SourceConfig,
    creds: &AwsCredentials,
) -> Result<Vec<Candidate>> {
    let include_set = build_globset(&s3_config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    default_excludes.extend(s3_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let client = reqwest::Client::new();
    let mut objects = list_objects(&client, s3_config, creds).await?;
    objects.sort();

    let mut candidates = Vec::new();
    for key in &objects {
        let rel_key = relative_key(&s3_config.prefix, key);
        if exclude_set.is_match(&rel_key) || !include_set.is_match(&rel_key) {
            continue;
        }

        let body = match download_object(&client, s3_config, creds, key).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(
                    source = label,
                    object = %format!("s3://{}/{}", s3_config.bucket, key),
                    error = %e,
                    "failed to download object"
                );
                continue;
            }
        };

        let provenance = format!("{}:s3://{}/{}", label, s3_config.bucket, key);
        let (object_key, id_column) = (key.clone(), s3_config.id_column.clone());
        let decoded = extractors::decode_blocking(move || {
            extractors::extract_bytes(&body, &object_key, &provenance, &id_column)
        })
        .await;
        match decoded {
            Ok(found) => candidates.extend(found),
            Err(e) => {
                tracing::warn!(source = label, object = %key, error = %e, "failed to extract object");
            }
        }
    }

    Ok(candidates)
}

/// Key relative to `prefix`, for glob matching.
fn relative_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }
    let prefix = prefix.trim_end_matches('/');
    key.strip_prefix(prefix)
        .map(|s| s.trim_start_matches('/').to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Virtual-hosted endpoint, or the configured override with its scheme.
/// Overrides use path-style addressing.
fn s3_endpoint(s3_config: &S3SourceConfig) -> (Endpoint, String) {
    match s3_config.endpoint_url {
        Some(ref url) => (Endpoint::parse(url), format!("/{}", s3_config.bucket)),
        None => (
            Endpoint::https(format!(
                "{}.s3.{}.amazonaws.com",
                s3_config.bucket, s3_config.region
            )),
            String::new(),
        ),
    }
}

/// List every object key in the bucket, following `NextContinuationToken`.
async fn list_objects(
    client: &reqwest::Client,
    s3_config: &S3SourceConfig,
    creds: &AwsCredentials,
) -> Result<Vec<String>> {
    let (endpoint, base_path) = s3_endpoint(s3_config);
    let path = format!("{}/", base_path);
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1000".to_string()),
        ];
        if !s3_config.prefix.is_empty() {
            query.push(("prefix".to_string(), s3_config.prefix.clone()));
        }
        if let Some(ref token) = continuation_token {
            query.push(("continuation-token".to_string(), token.clone()));
        }

        let signed = aws_sigv4::sign(
            &RequestSpec {
                method: "GET",
                endpoint: &endpoint,
                path: &path,
                query: &query,
                payload: b"",
                region: &s3_config.region,
                service: "s3",
            },
            creds,
            Utc::now(),
        );

        let resp = aws_sigv4::apply(client.get(&signed.url), &signed)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to list S3 objects in s3://{}/{}: {}",
                    s3_config.bucket,
                    s3_config.prefix,
                    e
                )
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 ListObjectsV2 failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let xml_body = resp.text().await?;
        let page = parse_list_objects_response(&xml_body);
        keys.extend(page.keys);

        match (page.is_truncated, page.next_token) {
            (true, Some(token)) => continuation_token = Some(token),
            _ => break,
        }
    }

    Ok(keys)
}

async fn download_object(
    client: &reqwest::Client,
    s3_config: &S3SourceConfig,
    creds: &AwsCredentials,
    key: &str,
) -> Result<Vec<u8>> {
    let (endpoint, base_path) = s3_endpoint(s3_config);
    let path = format!("{}/{}", base_path, aws_sigv4::uri_encode_path(key));

    let signed = aws_sigv4::sign(
        &RequestSpec {
            method: "GET",
            endpoint: &endpoint,
            path: &path,
            query: &[],
            payload: b"",
            region: &s3_config.region,
            service: "s3",
        },
        creds,
        Utc::now(),
    );

    let resp = aws_sigv4::apply(client.get(&signed.url), &signed)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get s3://{}/{}: {}", s3_config.bucket, key, e))?;

    if !resp.status().is_success() {
        bail!(
            "S3 GetObject failed (HTTP {}) for key '{}'",
            resp.status(),
            key
        );
    }

    Ok(resp.bytes().await?.to_vec())
}

// ============ XML Parsing ============

struct ListPage {
    keys: Vec<String>,
    is_truncated: bool,
    next_token: Option<String>,
}

/// Parse a `ListObjectsV2` response. Folder placeholders (keys ending in
/// `/`) are dropped.
fn parse_list_objects_response(xml: &str) -> ListPage {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(key) = extract_xml_value(block, "Key") {
            if !key.is_empty() && !key.ends_with('/') {
                keys.push(unescape_xml(&key));
            }
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    ListPage {
        keys,
        is_truncated,
        next_token,
    }
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_page() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>tok-2</NextContinuationToken>
            <Contents><Key>exports/accounts.csv</Key><Size>10</Size></Contents>
            <Contents><Key>exports/</Key></Contents>
            <Contents><Key>exports/R&amp;D.pdf</Key></Contents>
        </ListBucketResult>"#;
        let page = parse_list_objects_response(xml);
        assert_eq!(page.keys, vec!["exports/accounts.csv", "exports/R&D.pdf"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn relative_keys_strip_prefix() {
        assert_eq!(relative_key("exports/", "exports/a/b.csv"), "a/b.csv");
        assert_eq!(relative_key("", "a.csv"), "a.csv");
        assert_eq!(relative_key("other", "a.csv"), "a.csv");
    }

    #[test]
    fn custom_endpoint_uses_path_style() {
        let cfg = S3SourceConfig {
            bucket: "accts".into(),
            prefix: String::new(),
            region: "us-east-1".into(),
            include_globs: vec![],
            exclude_globs: vec![],
            endpoint_url: Some("http://localhost:9000".into()),
            id_column: extractors::DEFAULT_ID_COLUMN.into(),
        };
        let (endpoint, base) = s3_endpoint(&cfg);
        assert_eq!(endpoint.base_url(), "http://localhost:9000");
        assert_eq!(base, "/accts");
    }
}
