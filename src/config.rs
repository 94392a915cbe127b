//! TOML configuration.
//!
//! Every section is optional; a missing section takes the defaults below.
//! Sources are named instances under `[sources.<type>.<name>]`.
//!
//! ```toml
//! [snapshot]
//! path = "./data/accounts_snapshot.json"
//!
//! [refresh]
//! source_timeout_secs = 30
//! interval_secs = 0
//!
//! [query]
//! display_limit = 10
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [sources.table.inventory]
//! path = "./data/accounts.csv"
//!
//! [sources.filesystem.docs]
//! root = "./docs"
//!
//! [sources.knowledge_base.primary]
//! knowledge_base_id = "KB12345678"
//! region = "ap-south-1"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::extractors::DEFAULT_ID_COLUMN;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/accounts_snapshot.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Upper bound on a single source's scan.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    /// Period of the background refresh under `serve`. `0` disables it.
    #[serde(default)]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout_secs(),
            interval_secs: 0,
        }
    }
}

fn default_source_timeout_secs() -> u64 {
    30
}

/// Labels the intent resolver recognises, and the display cap.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    #[serde(default = "default_classification_labels")]
    pub classification_labels: Vec<String>,
    #[serde(default = "default_status_labels")]
    pub status_labels: Vec<String>,
    #[serde(default = "default_management_labels")]
    pub management_labels: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
            classification_labels: default_classification_labels(),
            status_labels: default_status_labels(),
            management_labels: default_management_labels(),
        }
    }
}

fn default_display_limit() -> usize {
    10
}
fn default_classification_labels() -> Vec<String> {
    vec!["class-1".into(), "class-2".into(), "class-3".into()]
}
fn default_status_labels() -> Vec<String> {
    vec!["ACTIVE".into(), "SUSPENDED".into()]
}
fn default_management_labels() -> Vec<String> {
    vec!["managed services".into(), "self service".into()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub table: BTreeMap<String, TableSourceConfig>,
    #[serde(default)]
    pub filesystem: BTreeMap<String, FilesystemSourceConfig>,
    #[serde(default)]
    pub s3: BTreeMap<String, S3SourceConfig>,
    #[serde(default)]
    pub knowledge_base: BTreeMap<String, KnowledgeBaseSourceConfig>,
}

impl SourcesConfig {
    pub fn len(&self) -> usize {
        self.table.len() + self.filesystem.len() + self.s3.len() + self.knowledge_base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single CSV or XLSX inventory file.
#[derive(Debug, Deserialize, Clone)]
pub struct TableSourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Id column for tabular files found under `root`.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3SourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// S3-compatible endpoint (MinIO, LocalStack). Scheme is kept.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

/// A Bedrock knowledge base queried through the `Retrieve` API.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseSourceConfig {
    pub knowledge_base_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_kb_queries")]
    pub queries: Vec<String>,
    #[serde(default = "default_number_of_results")]
    pub number_of_results: u32,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_include_globs() -> Vec<String> {
    ["txt", "md", "pdf", "docx", "csv", "xlsx"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}
fn default_kb_queries() -> Vec<String> {
    vec![
        "list all AWS account numbers and their owners".to_string(),
        "list all AWS account numbers".to_string(),
    ]
}
fn default_number_of_results() -> u32 {
    100
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.snapshot.path.as_os_str().is_empty() {
        bail!("snapshot.path must not be empty");
    }

    if config.refresh.source_timeout_secs == 0 {
        bail!("refresh.source_timeout_secs must be > 0");
    }

    if config.query.display_limit < 1 {
        bail!("query.display_limit must be >= 1");
    }
    for (section, labels) in [
        ("classification_labels", &config.query.classification_labels),
        ("status_labels", &config.query.status_labels),
        ("management_labels", &config.query.management_labels),
    ] {
        if labels.iter().any(|l| l.trim().is_empty()) {
            bail!("query.{} must not contain empty labels", section);
        }
    }

    for (name, table) in &config.sources.table {
        if table.path.as_os_str().is_empty() {
            bail!("sources.table.{}.path must not be empty", name);
        }
        if table.id_column.trim().is_empty() {
            bail!("sources.table.{}.id_column must not be empty", name);
        }
    }

    for (name, s3) in &config.sources.s3 {
        if s3.bucket.trim().is_empty() {
            bail!("sources.s3.{}.bucket must not be empty", name);
        }
    }

    for (name, kb) in &config.sources.knowledge_base {
        if kb.knowledge_base_id.trim().is_empty() {
            bail!("sources.knowledge_base.{}.knowledge_base_id must not be empty", name);
        }
        if kb.queries.is_empty() {
            bail!("sources.knowledge_base.{}.queries must not be empty", name);
        }
        if !(1..=100).contains(&kb.number_of_results) {
            bail!(
                "sources.knowledge_base.{}.number_of_results must be in [1, 100]",
                name
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_takes_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.query.display_limit, 10);
        assert_eq!(config.refresh.source_timeout_secs, 30);
        assert_eq!(config.query.status_labels, vec!["ACTIVE", "SUSPENDED"]);
        assert_eq!(
            config.snapshot.path,
            PathBuf::from("./data/accounts_snapshot.json")
        );
        assert!(config.sources.is_empty());
    }

    #[test]
    fn named_sources_parse() {
        let config = parse(
            r#"
            [sources.table.inventory]
            path = "accounts.csv"

            [sources.filesystem.docs]
            root = "./docs"
            include_globs = ["**/*.md"]

            [sources.knowledge_base.primary]
            knowledge_base_id = "KB1"
            region = "ap-south-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources.table["inventory"].id_column, "AWS Account Number");
        assert_eq!(config.sources.knowledge_base["primary"].queries.len(), 2);
        assert_eq!(config.sources.knowledge_base["primary"].number_of_results, 100);
    }

    #[test]
    fn zero_display_limit_is_rejected() {
        let err = parse("[query]\ndisplay_limit = 0\n").unwrap_err();
        assert!(err.to_string().contains("display_limit"));
    }

    #[test]
    fn empty_kb_id_is_rejected() {
        let err = parse("[sources.knowledge_base.kb]\nknowledge_base_id = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("knowledge_base_id"));
    }
}
