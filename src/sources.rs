//! Source listing and health checks.
//!
//! Local sources are healthy when their path exists. Remote sources (S3,
//! knowledge base) are checked for credentials only; no request is made.

use anyhow::Result;
use serde::Serialize;

use crate::aws_sigv4::AwsCredentials;
use crate::config::Config;

/// Status of one configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Source label, e.g. `"table:inventory"`.
    pub name: String,
    pub location: String,
    pub healthy: bool,
    pub notes: Option<String>,
}

pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    let mut out = Vec::new();

    for (name, cfg) in &config.sources.table {
        let exists = cfg.path.is_file();
        out.push(SourceStatus {
            name: format!("table:{}", name),
            location: cfg.path.display().to_string(),
            healthy: exists,
            notes: (!exists).then(|| "file does not exist".to_string()),
        });
    }

    for (name, cfg) in &config.sources.filesystem {
        let exists = cfg.root.is_dir();
        out.push(SourceStatus {
            name: format!("fs:{}", name),
            location: cfg.root.display().to_string(),
            healthy: exists,
            notes: (!exists).then(|| "root does not exist".to_string()),
        });
    }

    let creds = AwsCredentials::from_env();
    let creds_note = creds.as_ref().err().map(|e| e.to_string());

    for (name, cfg) in &config.sources.s3 {
        out.push(SourceStatus {
            name: format!("s3:{}", name),
            location: format!("s3://{}/{}", cfg.bucket, cfg.prefix),
            healthy: creds.is_ok(),
            notes: creds_note.clone(),
        });
    }

    for (name, cfg) in &config.sources.knowledge_base {
        out.push(SourceStatus {
            name: format!("kb:{}", name),
            location: format!("{} ({})", cfg.knowledge_base_id, cfg.region),
            healthy: creds.is_ok(),
            notes: creds_note.clone(),
        });
    }

    out
}

/// `acct sources`
pub fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config);
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!("{:<24} {:<8} LOCATION", "SOURCE", "HEALTHY");
    for s in &sources {
        println!("{:<24} {:<8} {}", s.name, s.healthy, s.location);
        if let Some(note) = &s.notes {
            println!("{:<24} {:<8} ({})", "", "", note);
        }
    }
    Ok(())
}
