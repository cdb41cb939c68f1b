//! The run orchestrator: window resolution, aggregation, loading, watermark
//! commit.
//!
//! A run either returns a [`RunReport`] the caller can inspect (including
//! per-resource record counts, so an all-empty run is visible) or a
//! [`RunFailure`] naming the stage that failed. Nothing is swallowed.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{aggregate, AggregateConfig};
use crate::error::EtlError;
use crate::load::load;
use crate::traits::{Extractor, MetricStore};
use crate::types::SyncWindow;

/// Configuration for one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Integration name; also the sync-state key (e.g. "meta",
    /// "rdstation").
    pub integration: String,
    /// Window reach when no watermark exists yet.
    pub lookback: Duration,
    /// Explicit window override; skips watermark resolution entirely.
    pub window: Option<SyncWindow>,
    /// Fan-out bounds for the aggregation stage.
    pub aggregate: AggregateConfig,
    /// Wall-clock limit for the whole run, when set.
    pub deadline: Option<std::time::Duration>,
}

impl RunConfig {
    pub fn new(integration: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            lookback: Duration::days(30),
            window: None,
            aggregate: AggregateConfig::default(),
            deadline: None,
        }
    }

    pub fn with_window(mut self, window: SyncWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.aggregate = self.aggregate.with_concurrency(concurrency);
        self
    }

    pub fn with_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The stage a run failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving the sync window from the watermark.
    Window,
    /// Aggregating extractor output.
    Extract,
    /// Upserting the bundle.
    Load,
    /// Advancing the watermark after a successful load.
    Commit,
    /// The run's overall deadline elapsed before the stages finished.
    Deadline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Window => write!(f, "window"),
            Stage::Extract => write!(f, "extract"),
            Stage::Load => write!(f, "load"),
            Stage::Commit => write!(f, "commit"),
            Stage::Deadline => write!(f, "deadline"),
        }
    }
}

/// A failed run: which stage broke, and the underlying error.
#[derive(Debug, Error)]
#[error("{stage} stage failed for {integration}: {source}")]
pub struct RunFailure {
    pub integration: String,
    pub stage: Stage,
    #[source]
    pub source: EtlError,
}

/// Record counts for one resource type in one run.
#[derive(Debug, Clone)]
pub struct ResourceCount {
    pub table: String,
    pub fetched: usize,
    pub loaded: u64,
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub integration: String,
    pub window: SyncWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resources: Vec<ResourceCount>,
}

impl RunReport {
    pub fn total_fetched(&self) -> usize {
        self.resources.iter().map(|r| r.fetched).sum()
    }

    pub fn total_loaded(&self) -> u64 {
        self.resources.iter().map(|r| r.loaded).sum()
    }
}

/// Run one integration end to end: resolve the window, aggregate, load,
/// commit the watermark.
///
/// The watermark only advances after a fully successful load; a re-run
/// after any failure is safe because loading is idempotent. When a deadline
/// is configured, a run that outlives it fails with [`Stage::Deadline`].
pub async fn run<S>(
    extractors: &[Box<dyn Extractor>],
    store: &S,
    config: &RunConfig,
) -> Result<RunReport, RunFailure>
where
    S: MetricStore + ?Sized,
{
    match config.deadline {
        Some(limit) => match tokio::time::timeout(limit, run_stages(extractors, store, config)).await
        {
            Ok(result) => result,
            Err(_) => Err(RunFailure {
                integration: config.integration.clone(),
                stage: Stage::Deadline,
                source: EtlError::DeadlineExceeded { limit },
            }),
        },
        None => run_stages(extractors, store, config).await,
    }
}

async fn run_stages<S>(
    extractors: &[Box<dyn Extractor>],
    store: &S,
    config: &RunConfig,
) -> Result<RunReport, RunFailure>
where
    S: MetricStore + ?Sized,
{
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let fail = |stage: Stage, source: EtlError| RunFailure {
        integration: config.integration.clone(),
        stage,
        source,
    };

    // Resolve the window: explicit override, else resume from the
    // watermark, else reach back by the configured lookback.
    let window = match config.window {
        Some(window) => window,
        None => match store
            .last_synced_at(&config.integration)
            .await
            .map_err(|e| fail(Stage::Window, e))?
        {
            Some(since) => SyncWindow::new(since, started_at),
            None => SyncWindow::lookback(config.lookback, started_at),
        },
    };

    info!(
        run_id = %run_id,
        integration = %config.integration,
        since = %window.since,
        until = %window.until,
        extractors = extractors.len(),
        "ETL run starting"
    );

    let bundle = aggregate(extractors, &window, &config.aggregate)
        .await
        .map_err(|e| fail(Stage::Extract, e))?;

    if bundle.is_empty() {
        // Every resource came back empty. Still a successful run, but worth
        // noticing: an expired token can look exactly like this.
        warn!(
            run_id = %run_id,
            integration = %config.integration,
            "aggregation produced no records for any resource type"
        );
    }

    let summary = load(&bundle, store)
        .await
        .map_err(|e| fail(Stage::Load, e))?;

    store
        .record_sync(&config.integration, window.until)
        .await
        .map_err(|e| fail(Stage::Commit, e))?;

    let resources = bundle
        .sets
        .iter()
        .map(|set| {
            let loaded = summary
                .loaded
                .iter()
                .find(|(table, _)| *table == set.spec.table)
                .map(|(_, rows)| *rows)
                .unwrap_or(0);
            ResourceCount {
                table: set.spec.table.clone(),
                fetched: set.len(),
                loaded,
            }
        })
        .collect();

    let report = RunReport {
        run_id,
        integration: config.integration.clone(),
        window,
        started_at,
        finished_at: Utc::now(),
        resources,
    };

    info!(
        run_id = %run_id,
        integration = %report.integration,
        fetched = report.total_fetched(),
        loaded = report.total_loaded(),
        "ETL run complete"
    );

    Ok(report)
}
