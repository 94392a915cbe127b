//! AWS Signature Version 4 request signing.
//!
//! Shared by the S3 and knowledge-base connectors. Pure Rust (`hmac` +
//! `sha2`), no AWS SDK.
//!
//! Credentials come from the environment:
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

/// Scheme and host of a service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
}

impl Endpoint {
    pub fn https(host: impl Into<String>) -> Self {
        Self {
            scheme: "https".to_string(),
            host: host.into(),
        }
    }

    /// Parse an override such as `http://localhost:9000/`. A missing scheme
    /// means `https`.
    pub fn parse(url: &str) -> Self {
        let (scheme, rest) = match url.split_once("://") {
            Some((scheme, rest)) => (scheme.to_string(), rest),
            None => ("https".to_string(), url),
        };
        Self {
            scheme,
            host: rest.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// What to sign. `path` must already be URI-encoded.
pub struct RequestSpec<'a> {
    pub method: &'a str,
    pub endpoint: &'a Endpoint,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub payload: &'a [u8],
    pub region: &'a str,
    pub service: &'a str,
}

/// Full URL plus the headers to attach to the outgoing request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

pub fn sign(spec: &RequestSpec<'_>, creds: &AwsCredentials, now: DateTime<Utc>) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut sorted_params = spec.query.to_vec();
    sorted_params.sort();
    let canonical_querystring: String = sorted_params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let payload_hash = hex_sha256(spec.payload);

    let mut headers = vec![
        ("host".to_string(), spec.endpoint.host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        spec.method,
        spec.path,
        canonical_querystring,
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, spec.region, spec.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &creds.secret_access_key,
        &date_stamp,
        spec.region,
        spec.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    let mut url = format!("{}{}", spec.endpoint.base_url(), spec.path);
    if !canonical_querystring.is_empty() {
        url.push('?');
        url.push_str(&canonical_querystring);
    }

    // `host` is set by the HTTP client itself.
    let mut out_headers: Vec<(String, String)> = headers
        .into_iter()
        .filter(|(k, _)| k != "host")
        .collect();
    out_headers.push(("authorization".to_string(), authorization));

    SignedRequest {
        url,
        headers: out_headers,
    }
}

/// Apply a [`SignedRequest`]'s headers to a reqwest builder.
pub fn apply(
    mut builder: reqwest::RequestBuilder,
    signed: &SignedRequest,
) -> reqwest::RequestBuilder {
    for (k, v) in &signed.headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder
}

pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Encode each segment of an object key, keeping the `/` separators.
pub fn uri_encode_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn signing_key_matches_documented_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("a b/c~"), "a%20b%2Fc~");
        assert_eq!(uri_encode_path("dir/my file.csv"), "dir/my%20file.csv");
    }

    #[test]
    fn endpoint_parse_keeps_scheme() {
        let ep = Endpoint::parse("http://127.0.0.1:9000/");
        assert_eq!(ep.scheme, "http");
        assert_eq!(ep.host, "127.0.0.1:9000");
        assert_eq!(Endpoint::parse("minio.local").base_url(), "https://minio.local");
    }

    #[test]
    fn signed_request_shape() {
        let creds = AwsCredentials::new("AKID", "SECRET", Some("TOKEN".into()));
        let endpoint = Endpoint::https("bedrock-agent-runtime.ap-south-1.amazonaws.com");
        let query = vec![("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())];
        let spec = RequestSpec {
            method: "POST",
            endpoint: &endpoint,
            path: "/knowledgebases/KB1/retrieve",
            query: &query,
            payload: b"{}",
            region: "ap-south-1",
            service: "bedrock",
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let signed = sign(&spec, &creds, now);

        assert_eq!(
            signed.url,
            "https://bedrock-agent-runtime.ap-south-1.amazonaws.com/knowledgebases/KB1/retrieve?a=1&b=2"
        );
        let auth = &signed
            .headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .unwrap()
            .1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKID/20240501/ap-south-1/bedrock/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        assert!(signed.headers.iter().any(|(k, v)| k == "x-amz-date" && v == "20240501T120000Z"));
        assert!(!signed.headers.iter().any(|(k, _)| k == "host"));
    }
}
