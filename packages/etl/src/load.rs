//! Loading: idempotent per-table upserts with run-all-then-report failure
//! handling.

use futures::future::join_all;
use tracing::{debug, info};

use crate::error::{EtlError, LoadError, Result};
use crate::traits::MetricStore;
use crate::types::Bundle;

/// What one load pass actually did.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    /// (table, rows written) per committed table, in bundle order.
    pub loaded: Vec<(String, u64)>,
    /// Tables whose resource set was empty; no write was issued for them.
    pub skipped: Vec<String>,
}

impl LoadSummary {
    /// Total rows written across all tables.
    pub fn rows_written(&self) -> u64 {
        self.loaded.iter().map(|(_, rows)| rows).sum()
    }
}

/// Upsert every non-empty resource set in the bundle against its destination
/// table.
///
/// All per-table upserts run to completion regardless of individual
/// failures; if any failed, one aggregate [`LoadError`] names every failed
/// table. Successful tables stay committed. Empty sets are skipped without
/// issuing a write.
pub async fn load<S>(bundle: &Bundle, store: &S) -> Result<LoadSummary>
where
    S: MetricStore + ?Sized,
{
    let mut summary = LoadSummary::default();

    for set in bundle.sets.iter().filter(|s| s.is_empty()) {
        debug!(table = %set.spec.table, "skipping empty collection");
        summary.skipped.push(set.spec.table.clone());
    }

    let futures = bundle
        .sets
        .iter()
        .filter(|set| !set.is_empty())
        .map(|set| async move {
            match store.upsert(set).await {
                Ok(rows) => Ok((set.spec.table.clone(), rows)),
                Err(err) => Err((set.spec.table.clone(), err)),
            }
        });

    let mut failures = Vec::new();
    for result in join_all(futures).await {
        match result {
            Ok((table, rows)) => {
                info!(table = %table, rows = rows, "table loaded");
                summary.loaded.push((table, rows));
            }
            Err(failure) => failures.push(failure),
        }
    }

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(EtlError::Load(LoadError { failures }))
    }
}
