//! Typed errors for the refresh pipeline.
//!
//! Source-level failures are recovered inside the refresh cycle: they are
//! logged and recorded on the source's [`SourceOutput`](crate::models::SourceOutput),
//! never propagated to queries. Query-level "not found" conditions are not
//! errors at all; see [`crate::query`].

use thiserror::Error;

/// Why one source contributed nothing to a refresh cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be read (network, file, or decode failure).
    #[error("source {source_label} unavailable: {message}")]
    Unavailable {
        source_label: String,
        message: String,
    },

    /// The source did not finish within the configured bound.
    #[error("source {source_label} timed out after {secs}s")]
    TimedOut { source_label: String, secs: u64 },
}

impl SourceError {
    pub fn unavailable(source_label: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SourceError::Unavailable {
            source_label: source_label.into(),
            message: format!("{:#}", err),
        }
    }
}

/// Refresh-level conditions that trigger the fallback chain. Never reach a
/// query caller; they surface only as a [`RegistryOrigin`](crate::merge::RegistryOrigin).
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("refresh produced an empty registry")]
    EmptyRegistry,

    #[error("snapshot {path} unreadable: {message}")]
    Snapshot { path: String, message: String },
}

/// Failure to decode a binary or tabular payload into text or rows.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    /// The decoder panicked; the payload's message is kept.
    #[error("decoder panicked: {0}")]
    Panicked(String),
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
