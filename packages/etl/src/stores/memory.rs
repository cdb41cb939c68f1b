//! In-memory `MetricStore` for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::traits::MetricStore;
use crate::types::{Record, ResourceSet};

/// A `MetricStore` backed by in-process maps. Rows are keyed by their
/// conflict-key values, so upserts have the same insert-or-overwrite
/// semantics as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Record>>>,
    sync_state: Mutex<HashMap<String, DateTime<Utc>>>,
    upsert_calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Snapshot of a table's rows, ordered by conflict key.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Tables that received an upsert call, in call order. Lets tests assert
    /// that empty collections issued no write at all.
    pub fn upsert_calls(&self) -> Vec<String> {
        self.upsert_calls.lock().unwrap().clone()
    }
}

/// Serialize a record's conflict-key values into a map key, failing on the
/// first missing column.
fn conflict_value(record: &Record, table: &str, conflict_key: &[String]) -> Result<String> {
    let mut values = Vec::with_capacity(conflict_key.len());
    for column in conflict_key {
        let value = record
            .get(column)
            .filter(|v| !v.is_null())
            .ok_or_else(|| EtlError::MissingConflictKey {
                table: table.to_string(),
                column: column.clone(),
            })?;
        values.push(value.clone());
    }
    Ok(Value::Array(values).to_string())
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn upsert(&self, set: &ResourceSet) -> Result<u64> {
        self.upsert_calls.lock().unwrap().push(set.spec.table.clone());

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(set.spec.table.clone()).or_default();

        for record in &set.records {
            let key = conflict_value(record, &set.spec.table, &set.spec.conflict_key)?;
            rows.insert(key, record.clone());
        }

        Ok(set.records.len() as u64)
    }

    async fn last_synced_at(&self, integration: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.sync_state.lock().unwrap().get(integration).copied())
    }

    async fn record_sync(&self, integration: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.sync_state
            .lock()
            .unwrap()
            .insert(integration.to_string(), synced_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceSpec;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let spec = ResourceSpec::new("meta_ad_insights", ["ad_id", "date_start"]);

        let set = ResourceSet::new(
            spec.clone(),
            vec![
                json!({"ad_id": "a1", "date_start": "2024-03-01", "clicks": 10}),
                json!({"ad_id": "a2", "date_start": "2024-03-01", "clicks": 5}),
            ],
        );

        store.upsert(&set).await.unwrap();
        store.upsert(&set).await.unwrap();

        assert_eq!(store.row_count("meta_ad_insights"), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_non_key_columns() {
        let store = MemoryStore::new();
        let spec = ResourceSpec::new("ad_creatives", ["id"]);

        store
            .upsert(&ResourceSet::new(
                spec.clone(),
                vec![json!({"id": "c1", "title": "old"})],
            ))
            .await
            .unwrap();
        store
            .upsert(&ResourceSet::new(
                spec,
                vec![json!({"id": "c1", "title": "new"})],
            ))
            .await
            .unwrap();

        let rows = store.rows("ad_creatives");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "new");
    }

    #[tokio::test]
    async fn test_missing_conflict_key_is_an_error() {
        let store = MemoryStore::new();
        let spec = ResourceSpec::new("meta_ad_insights", ["ad_id", "date_start"]);

        let err = store
            .upsert(&ResourceSet::new(spec, vec![json!({"ad_id": "a1"})]))
            .await
            .unwrap_err();

        match err {
            EtlError::MissingConflictKey { table, column } => {
                assert_eq!(table, "meta_ad_insights");
                assert_eq!(column, "date_start");
            }
            other => panic!("expected MissingConflictKey, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_state_round_trip() {
        let store = MemoryStore::new();
        assert!(store.last_synced_at("meta").await.unwrap().is_none());

        let at = Utc::now();
        store.record_sync("meta", at).await.unwrap();
        assert_eq!(store.last_synced_at("meta").await.unwrap(), Some(at));
    }
}
