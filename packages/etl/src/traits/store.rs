//! Warehouse storage trait (to allow mocking).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::ResourceSet;

/// Destination for loaded records plus the per-integration sync watermark.
///
/// The production implementation is
/// [`crate::stores::PostgresStore`]; tests use
/// [`crate::stores::MemoryStore`].
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Insert-or-update every record in the set against its destination
    /// table, keyed by the declared conflict columns. Re-running with the
    /// same set must leave the table in the same final state.
    ///
    /// Returns the number of rows written.
    async fn upsert(&self, set: &ResourceSet) -> Result<u64>;

    /// High-watermark of the last successful run for an integration, if any.
    async fn last_synced_at(&self, integration: &str) -> Result<Option<DateTime<Utc>>>;

    /// Advance the integration's watermark.
    async fn record_sync(&self, integration: &str, synced_at: DateTime<Utc>) -> Result<()>;
}
