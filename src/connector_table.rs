//! Tabular file connector.
//!
//! Reads one CSV or XLSX inventory file and runs the tabular extractor over
//! it. The file's extension picks the decoder.
//!
//! ```toml
//! [sources.table.inventory]
//! path = "./data/accounts.csv"
//! id_column = "AWS Account Number"
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::TableSourceConfig;
use crate::extract;
use crate::extractors::{self, RawInput};
use crate::models::Candidate;
use crate::traits::Connector;

pub struct TableConnector {
    name: String,
    config: TableSourceConfig,
}

impl TableConnector {
    pub fn new(name: String, config: TableSourceConfig) -> Self {
        Self { name, config }
    }
}

#[async_trait]
impl Connector for TableConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Read account rows from a CSV or XLSX file"
    }

    fn connector_type(&self) -> &str {
        "table"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        scan_table(&self.source_label(), &self.config).await
    }
}

pub async fn scan_table(label: &str, config: &TableSourceConfig) -> Result<Vec<Candidate>> {
    let path = &config.path;
    let key = path.to_string_lossy();
    let content_type = extract::detect_content_type(&key);
    if !extract::is_tabular(content_type) {
        bail!(
            "table source {} must be a .csv or .xlsx file: {}",
            label,
            path.display()
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read table file: {}", path.display()))?;
    let table = extractors::decode_blocking(move || extract::extract_table(&bytes, content_type))
        .await
        .with_context(|| format!("Failed to decode table file: {}", path.display()))?;

    if table.column(&config.id_column).is_none() {
        tracing::warn!(
            source = label,
            column = %config.id_column,
            "id column not found; only embedded ids will be extracted"
        );
    }

    let provenance = format!("{}:{}", label, path.display());
    let candidates = extractors::extract(
        &RawInput::Table {
            table,
            id_column: config.id_column.clone(),
        },
        &provenance,
    );
    tracing::debug!(source = label, candidates = candidates.len(), "table scanned");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(path: PathBuf) -> TableSourceConfig {
        TableSourceConfig {
            path,
            id_column: extractors::DEFAULT_ID_COLUMN.to_string(),
        }
    }

    #[tokio::test]
    async fn reads_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.csv");
        std::fs::write(
            &path,
            "AWS Account Number,AWS account Name\n123456789012,payments\n210987654321,search\n",
        )
        .unwrap();

        let cands = scan_table("table:inv", &config(path)).await.unwrap();
        assert_eq!(cands.len(), 2);
        assert!(cands[0].provenance.starts_with("table:inv:"));
        assert!(cands[0].provenance.ends_with("accounts.csv#row=1"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_table("table:inv", &config(dir.path().join("nope.csv")))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read table file"));
    }

    #[tokio::test]
    async fn corrupt_xlsx_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();

        let err = scan_table("table:inv", &config(path)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to decode table file"));
    }

    #[tokio::test]
    async fn non_tabular_extension_is_rejected() {
        let err = scan_table("table:inv", &config(PathBuf::from("notes.txt")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".csv or .xlsx"));
    }
}
