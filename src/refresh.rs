//! Refresh cycle: scan every source, merge, fall back, publish.
//!
//! Sources are scanned concurrently, each under the configured timeout. A
//! failing or slow source is recorded in the report and contributes nothing;
//! it never aborts the cycle.
//!
//! Queries read an immutable `Arc<AccountStore>`. A refresh builds a whole
//! new store and swaps the pointer, so a reader sees either the old registry
//! or the new one, never a mix.

use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::Config;
use crate::error::{panic_message, SourceError};
use crate::merge::{self, RegistryOrigin};
use crate::models::{AccountRegistry, SourceOutput};
use crate::store::AccountStore;
use crate::traits::{Connector, ConnectorRegistry};

/// Per-source line of a [`RefreshReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub candidates: usize,
    pub error: Option<String>,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub origin: RegistryOrigin,
    pub accounts: usize,
    pub sources: Vec<SourceReport>,
}

async fn scan_one(connector: &dyn Connector, timeout: Duration) -> SourceOutput {
    let label = connector.source_label();
    let scan = AssertUnwindSafe(connector.scan()).catch_unwind();
    match tokio::time::timeout(timeout, scan).await {
        Ok(Ok(Ok(candidates))) => {
            tracing::info!(source = %label, candidates = candidates.len(), "source scanned");
            SourceOutput::ok(label, candidates)
        }
        Ok(Ok(Err(e))) => {
            let err = SourceError::unavailable(&label, e);
            tracing::warn!(error = %err, "source failed");
            SourceOutput::failed(label, err)
        }
        Ok(Err(payload)) => {
            let message = format!("scan panicked: {}", panic_message(payload.as_ref()));
            let err = SourceError::unavailable(&label, message);
            tracing::error!(error = %err, "source failed");
            SourceOutput::failed(label, err)
        }
        Err(_) => {
            let err = SourceError::TimedOut {
                source_label: label.clone(),
                secs: timeout.as_secs(),
            };
            tracing::warn!(error = %err, "source failed");
            SourceOutput::failed(label, err)
        }
    }
}

/// Scan every registered connector concurrently. Output order follows
/// registration order.
pub async fn collect_outputs(
    connectors: &ConnectorRegistry,
    timeout: Duration,
) -> Vec<SourceOutput> {
    join_all(
        connectors
            .connectors()
            .iter()
            .map(|c| scan_one(c.as_ref(), timeout)),
    )
    .await
}

/// Run one cycle and build the store to publish.
///
/// `previous` is the currently published registry, used when every source
/// comes back empty. A fresh registry is persisted as the new snapshot; a
/// failed write is logged and does not affect the result.
pub async fn refresh(
    config: &Config,
    connectors: &ConnectorRegistry,
    previous: Option<&AccountRegistry>,
) -> (AccountStore, RefreshReport) {
    let timeout = Duration::from_secs(config.refresh.source_timeout_secs);
    let outputs = collect_outputs(connectors, timeout).await;

    let fresh = merge::merge(&outputs);
    let (registry, origin) = merge::with_fallback(fresh, previous, &config.snapshot.path);

    if origin == RegistryOrigin::Fresh {
        if let Err(e) = merge::save_snapshot(&registry, &config.snapshot.path) {
            tracing::warn!(error = %format!("{:#}", e), "failed to persist snapshot");
        }
    }

    let report = RefreshReport {
        origin,
        accounts: registry.len(),
        sources: outputs
            .iter()
            .map(|o| SourceReport {
                source: o.source.clone(),
                candidates: o.candidates.len(),
                error: o.error.as_ref().map(|e| e.to_string()),
            })
            .collect(),
    };
    tracing::info!(origin = origin.as_str(), accounts = report.accounts, "refresh complete");

    (AccountStore::new(registry, origin), report)
}

/// Shared pointer to the published store.
///
/// Cloning the handle shares the same slot. Refreshes through one handle
/// are serialized; readers never wait on a refresh, only on the pointer
/// swap.
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<RwLock<Arc<AccountStore>>>,
    refreshing: Arc<tokio::sync::Mutex<()>>,
}

impl SnapshotHandle {
    pub fn new(store: AccountStore) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(store))),
            refreshing: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn empty() -> Self {
        Self::new(AccountStore::empty())
    }

    /// The store queries should read right now.
    pub fn current(&self) -> Arc<AccountStore> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, store: AccountStore) {
        let store = Arc::new(store);
        match self.current.write() {
            Ok(mut guard) => *guard = store,
            Err(poisoned) => *poisoned.into_inner() = store,
        }
    }

    /// Refresh from `connectors` and publish the result.
    pub async fn refresh_now(
        &self,
        config: &Config,
        connectors: &ConnectorRegistry,
    ) -> RefreshReport {
        let _guard = self.refreshing.lock().await;
        let previous = self.current();
        let previous = Some(previous.registry()).filter(|r| !r.is_empty());
        let (store, report) = refresh(config, connectors, previous).await;
        self.publish(store);
        report
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::empty()
    }
}

/// Refresh every `interval` in the background. The first tick fires after
/// one full interval.
pub fn spawn_periodic(
    config: Arc<Config>,
    connectors: Arc<ConnectorRegistry>,
    handle: SnapshotHandle,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            handle.refresh_now(&config, &connectors).await;
        }
    })
}

/// `acct refresh`: one cycle from the configured sources, printed as a table.
pub async fn run_refresh(config: &Config, as_json: bool) -> Result<()> {
    let connectors = ConnectorRegistry::from_config(config);
    if connectors.is_empty() {
        tracing::warn!("no sources configured");
    }
    let (_, report) = refresh(config, &connectors, None).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<32} {:>10}   STATUS", "SOURCE", "CANDIDATES");
    for s in &report.sources {
        let status = s.error.as_deref().unwrap_or("ok");
        println!("{:<32} {:>10}   {}", s.source, s.candidates, status);
    }
    println!();
    println!(
        "{} accounts ({}), snapshot: {}",
        report.accounts,
        report.origin.as_str(),
        config.snapshot.path.display()
    );
    Ok(())
}
