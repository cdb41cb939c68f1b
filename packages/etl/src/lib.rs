//! Marketing-metrics ETL pipeline.
//!
//! Extracts paginated collections from third-party marketing APIs,
//! aggregates them concurrently into a per-run bundle, and idempotently
//! upserts each resource type into its warehouse table, keyed by a declared
//! conflict column set.
//!
//! # Pipeline
//!
//! ```text
//! run (orchestrator)
//!     │
//!     ├─► resolve window (etl_sync_state watermark, or lookback)
//!     ├─► aggregate: extractors fan out, bounded by a semaphore
//!     │       └─► fetch_all_pages (cursor loop over a PageSource)
//!     ├─► load: one upsert per non-empty resource set, all run,
//!     │         failures reported together
//!     └─► commit watermark
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use etl::{run, PostgresStore, RunConfig};
//!
//! let store = PostgresStore::new(pool);
//! let extractors = client.extractors();
//! let report = run(&extractors, &store, &RunConfig::new("meta")).await?;
//! println!("loaded {} rows", report.total_loaded());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (PageSource, Extractor,
//!   MetricStore)
//! - [`types`] - Page envelopes, resource specs, bundles, sync windows
//! - [`client`] - Production HTTP source with retry and rate limiting
//! - [`stores`] - Storage implementations (Postgres, in-memory)
//! - [`testing`] - Mock implementations for testing

pub mod aggregate;
pub mod client;
pub mod error;
pub mod fetch;
pub mod load;
pub mod run;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{EtlError, LoadError, Result};
pub use traits::{Extractor, MetricStore, PageSource};
pub use types::{Bundle, Page, Record, ResourceSet, ResourceSpec, SyncWindow};

// Re-export pipeline components
pub use aggregate::{aggregate, AggregateConfig};
pub use client::{HttpPageSource, RateLimitedSource, RetryPolicy, SourceExt};
pub use fetch::{fetch_all_pages, fetch_all_pages_limited, DEFAULT_PAGE_LIMIT};
pub use load::{load, LoadSummary};
pub use run::{run, ResourceCount, RunConfig, RunFailure, RunReport, Stage};

// Re-export stores
pub use stores::{MemoryStore, PostgresStore};
