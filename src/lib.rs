//! # Account Harness
//!
//! A registry of AWS accounts assembled from sources that disagree on shape:
//! spreadsheets with one row per account, free-form documents that mention
//! account numbers in passing, and vector-search knowledge bases that return
//! loosely structured snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌────────────┐   ┌─────────┐   ┌──────────────┐
//! │ Connectors       │──▶│ Extractors │──▶│ Merger  │──▶│ AccountStore │
//! │ table/fs/s3/kb   │   │ tab/doc/kb │   │+snapshot│   │  (Arc swap)  │
//! └──────────────────┘   └────────────┘   └─────────┘   └──────┬───────┘
//!                                                              │
//!                                   ┌──────────────────────────┤
//!                                   ▼                          ▼
//!                            ┌────────────┐             ┌────────────┐
//!                            │ CLI (acct) │             │    HTTP    │
//!                            └────────────┘             └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`account_id`] | Canonical 12-digit ids and the shared id patterns |
//! | [`digits`] | Digit-by-digit reading of an id |
//! | [`models`] | Candidates, records, and the registry |
//! | [`extract`] | PDF/OOXML/CSV decoding |
//! | [`extractors`] | Tabular, document, and vector-search extractors |
//! | [`connector_table`] | CSV/XLSX inventory file |
//! | [`connector_fs`] | Local directory of mixed files |
//! | [`connector_s3`] | S3 prefix of mixed files |
//! | [`connector_kb`] | Bedrock knowledge base |
//! | [`aws_sigv4`] | SigV4 request signing |
//! | [`merge`] | Registry merge, fallback, and snapshot persistence |
//! | [`refresh`] | Concurrent refresh cycle and the published snapshot |
//! | [`store`] | Read-only queries over one registry |
//! | [`intent`] | Free-text intent resolution |
//! | [`format`] | Text and JSON responses |
//! | [`query`] | Typed operations and their outcomes |
//! | [`traits`] | `Connector` and `Tool` extension points |
//! | [`server`] | HTTP server |
//! | [`config`] | TOML configuration |

pub mod account_id;
pub mod aws_sigv4;
pub mod config;
pub mod connector_fs;
pub mod connector_kb;
pub mod connector_s3;
pub mod connector_table;
pub mod digits;
pub mod error;
pub mod extract;
pub mod extractors;
pub mod format;
pub mod intent;
pub mod merge;
pub mod models;
pub mod query;
pub mod refresh;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
pub mod traits;
