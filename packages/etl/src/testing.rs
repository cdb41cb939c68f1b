//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline without
//! making real network or database calls.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::stores::MemoryStore;
use crate::traits::{Extractor, MetricStore, PageSource};
use crate::types::{Record, ResourceSet, ResourceSpec, SyncWindow};

enum Scripted {
    Page(Value),
    Error(EtlError),
}

/// A `PageSource` that serves scripted responses in order and records every
/// requested URL for assertions.
#[derive(Default)]
pub struct MockSource {
    responses: Mutex<VecDeque<Scripted>>,
    requested: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page body to serve.
    pub fn with_page(self, body: Value) -> Self {
        self.responses.lock().unwrap().push_back(Scripted::Page(body));
        self
    }

    /// Queue an error to serve.
    pub fn with_error(self, err: EtlError) -> Self {
        self.responses.lock().unwrap().push_back(Scripted::Error(err));
        self
    }

    /// Every URL requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for MockSource {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Scripted::Page(body)) => Ok(body),
            Some(Scripted::Error(err)) => Err(err),
            None => Err(EtlError::Config(format!(
                "MockSource exhausted, unexpected request for {url}"
            ))),
        }
    }
}

/// An `Extractor` that returns a fixed record batch and records the windows
/// it was asked for.
pub struct StaticExtractor {
    spec: ResourceSpec,
    records: Vec<Record>,
    windows: Mutex<Vec<SyncWindow>>,
}

impl StaticExtractor {
    pub fn new(spec: ResourceSpec, records: Vec<Record>) -> Self {
        Self {
            spec,
            records,
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Windows passed to `extract` so far.
    pub fn windows(&self) -> Vec<SyncWindow> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    async fn extract(&self, window: &SyncWindow) -> Result<Vec<Record>> {
        self.windows.lock().unwrap().push(*window);
        Ok(self.records.clone())
    }
}

/// An `Extractor` that always fails.
pub struct FailingExtractor {
    spec: ResourceSpec,
    message: String,
}

impl FailingExtractor {
    pub fn new(spec: ResourceSpec, message: impl Into<String>) -> Self {
        Self {
            spec,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Extractor for FailingExtractor {
    fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    async fn extract(&self, _window: &SyncWindow) -> Result<Vec<Record>> {
        Err(EtlError::upstream(self.message.clone()))
    }
}

/// An `Extractor` that tracks how many extracts are in flight at once.
/// Shared across a set of probes to assert a concurrency bound.
pub struct ConcurrencyProbe {
    spec: ResourceSpec,
    in_flight: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
    hold: Duration,
}

impl ConcurrencyProbe {
    /// Build `n` probes sharing one gauge; returns the probes and the
    /// max-in-flight counter.
    pub fn fleet(n: usize, hold: Duration) -> (Vec<Self>, Arc<AtomicUsize>) {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let probes = (0..n)
            .map(|i| Self {
                spec: ResourceSpec::new(format!("probe_{i}"), ["id"]),
                in_flight: in_flight.clone(),
                max_seen: max_seen.clone(),
                hold,
            })
            .collect();
        (probes, max_seen)
    }
}

#[async_trait]
impl Extractor for ConcurrencyProbe {
    fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    async fn extract(&self, _window: &SyncWindow) -> Result<Vec<Record>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

/// A `MetricStore` wrapper that fails upserts for selected tables while
/// delegating everything else to an in-memory store.
pub struct FailingStore {
    inner: MemoryStore,
    fail_tables: HashSet<String>,
}

impl FailingStore {
    pub fn new(fail_tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_tables: fail_tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl MetricStore for FailingStore {
    async fn upsert(&self, set: &ResourceSet) -> Result<u64> {
        if self.fail_tables.contains(&set.spec.table) {
            return Err(EtlError::storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected failure for {}", set.spec.table),
            )));
        }
        self.inner.upsert(set).await
    }

    async fn last_synced_at(&self, integration: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.last_synced_at(integration).await
    }

    async fn record_sync(&self, integration: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.inner.record_sync(integration, synced_at).await
    }
}
