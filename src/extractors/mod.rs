//! Source extractors: raw input in, [`Candidate`]s out.
//!
//! Extractors are pure. Connectors do the I/O and hand over one of the
//! [`RawInput`] shapes; anything that can fail during decoding happens in
//! [`extract_bytes`] and is reported to the connector as an
//! [`ExtractError`].

pub mod document;
pub mod tabular;
pub mod vector;

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{panic_message, ExtractError};
use crate::extract;
use crate::models::Candidate;

pub use document::extract_document;
pub use tabular::{extract_table, Table};
pub use vector::{extract_snippets, Snippet};

/// Column holding the primary id in tabular sources unless configured.
pub const DEFAULT_ID_COLUMN: &str = "AWS Account Number";

/// The three source shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Tabular,
    Document,
    VectorSearch,
}

/// Decoded input for one extractor.
#[derive(Debug, Clone)]
pub enum RawInput {
    Table { table: Table, id_column: String },
    Text(String),
    Snippets(Vec<Snippet>),
}

impl RawInput {
    pub fn kind(&self) -> SourceKind {
        match self {
            RawInput::Table { .. } => SourceKind::Tabular,
            RawInput::Text(_) => SourceKind::Document,
            RawInput::Snippets(_) => SourceKind::VectorSearch,
        }
    }
}

/// Run the extractor matching the input's shape.
pub fn extract(input: &RawInput, provenance: &str) -> Vec<Candidate> {
    match input {
        RawInput::Table { table, id_column } => extract_table(table, id_column, provenance),
        RawInput::Text(text) => extract_document(text, provenance),
        RawInput::Snippets(snippets) => extract_snippets(snippets, provenance),
    }
}

/// Decode a file or object body by its key's extension and extract from it.
///
/// `.csv`/`.xlsx` go through the tabular extractor; everything else is
/// turned into text (PDF, DOCX, or UTF-8) for the document extractor.
pub fn extract_bytes(
    bytes: &[u8],
    key: &str,
    provenance: &str,
    id_column: &str,
) -> Result<Vec<Candidate>, ExtractError> {
    let content_type = extract::detect_content_type(key);
    let input = if extract::is_tabular(content_type) {
        RawInput::Table {
            table: extract::extract_table(bytes, content_type)?,
            id_column: id_column.to_string(),
        }
    } else {
        RawInput::Text(extract::extract_text(bytes, content_type)?)
    };
    Ok(extract(&input, provenance))
}

/// Run a decoder on the current thread, turning a panic into
/// [`ExtractError::Panicked`].
///
/// Used where the caller is already on a blocking thread and one bad file
/// must not take its siblings down with it.
pub fn decode_guarded<T>(
    decode: impl FnOnce() -> Result<T, ExtractError>,
) -> Result<T, ExtractError> {
    catch_unwind(AssertUnwindSafe(decode))
        .unwrap_or_else(|payload| Err(ExtractError::Panicked(panic_message(payload.as_ref()))))
}

/// Run a decoder on tokio's blocking pool.
///
/// Keeps CPU-bound decoding off the async workers so the per-source
/// timeout can fire; a panic comes back as [`ExtractError::Panicked`].
pub async fn decode_blocking<T, F>(decode: F) -> Result<T, ExtractError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
{
    match tokio::task::spawn_blocking(decode).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(ExtractError::Panicked(panic_message(
            e.into_panic().as_ref(),
        ))),
        Err(e) => Err(ExtractError::Panicked(e.to_string())),
    }
}
