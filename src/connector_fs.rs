//! Filesystem connector.
//!
//! Walks a directory of account documents (text, Markdown, PDF, DOCX, and
//! tabular files), filters paths with include/exclude globs and extracts
//! candidates from every matching file. A file that cannot be decoded is
//! logged and skipped; the rest of the directory still counts.
//!
//! ```toml
//! [sources.filesystem.docs]
//! root = "./docs"
//! include_globs = ["**/*.md", "**/*.pdf"]
//! exclude_globs = ["**/drafts/**"]
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::FilesystemSourceConfig;
use crate::extractors;
use crate::models::Candidate;
use crate::traits::Connector;

pub struct FilesystemConnector {
    name: String,
    config: FilesystemSourceConfig,
}

impl FilesystemConnector {
    pub fn new(name: String, config: FilesystemSourceConfig) -> Self {
        Self { name, config }
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Extract account ids from documents in a local directory"
    }

    fn connector_type(&self) -> &str {
        "fs"
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        let label = self.source_label();
        let config = self.config.clone();
        // Directory walking and PDF decoding block.
        tokio::task::spawn_blocking(move || scan_filesystem(&label, &config)).await?
    }
}

pub fn scan_filesystem(label: &str, fs_config: &FilesystemSourceConfig) -> Result<Vec<Candidate>> {
    let root = &fs_config.root;
    if !root.exists() {
        bail!(
            "Filesystem source root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&fs_config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(fs_config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    // Deterministic discovery order.
    files.sort_by(|a, b| a.1.cmp(&b.1));

    let mut candidates = Vec::new();
    for (path, rel_str) in files {
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(source = label, file = %rel_str, error = %e, "failed to read file");
                continue;
            }
        };
        let provenance = format!("{}:{}", label, rel_str);
        let decoded = extractors::decode_guarded(|| {
            extractors::extract_bytes(&bytes, &rel_str, &provenance, &fs_config.id_column)
        });
        match decoded {
            Ok(found) => candidates.extend(found),
            Err(e) => {
                tracing::warn!(source = label, file = %rel_str, error = %e, "failed to extract file");
            }
        }
    }

    Ok(candidates)
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(root: &Path) -> FilesystemSourceConfig {
        FilesystemSourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".into(), "**/*.csv".into()],
            exclude_globs: vec!["**/drafts/**".into()],
            follow_symlinks: false,
            id_column: extractors::DEFAULT_ID_COLUMN.to_string(),
        }
    }

    #[test]
    fn walks_matching_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "Account ID: 1111-2222-3333\n").unwrap();
        std::fs::write(
            dir.path().join("a.csv"),
            "AWS Account Number,Status\n444455556666,ACTIVE\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "777788889999").unwrap();
        std::fs::create_dir(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/x.md"), "999900001111").unwrap();

        let cands = scan_filesystem("fs:docs", &config(dir.path())).unwrap();
        let ids: Vec<&str> = cands.iter().map(|c| c.raw_id.as_str()).collect();
        assert_eq!(ids, vec!["444455556666", "111122223333"]);
        assert_eq!(cands[0].provenance, "fs:docs:a.csv#row=1");
        assert_eq!(cands[1].provenance, "fs:docs:b.md#lines=1-1");
    }

    #[test]
    fn undecodable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.include_globs = vec!["**/*".into()];
        std::fs::write(dir.path().join("broken.docx"), b"not a zip").unwrap();
        std::fs::write(dir.path().join("ok.txt"), "123456789012").unwrap();

        let cands = scan_filesystem("fs:docs", &cfg).unwrap();
        assert_eq!(cands.len(), 1);
    }

    #[test]
    fn spreadsheet_with_runaway_column_is_skipped() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.include_globs = vec!["**/*".into()];

        let sheet = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#;
        let mut xlsx = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut xlsx));
            zip.start_file("xl/worksheets/sheet1.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(sheet.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        std::fs::write(dir.path().join("inventory.xlsx"), xlsx).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Account ID: 123456789012").unwrap();

        let cands = scan_filesystem("fs:docs", &cfg).unwrap();
        assert_eq!(cands.len(), 1);
        assert!(cands[0].provenance.starts_with("fs:docs:notes.txt"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_filesystem("fs:docs", &config(&dir.path().join("missing"))).is_err());
    }
}
