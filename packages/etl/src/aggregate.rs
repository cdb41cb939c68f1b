//! Aggregation: concurrent extractor fan-out into one bundle.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::Result;
use crate::traits::Extractor;
use crate::types::{Bundle, ResourceSet, SyncWindow};

/// Configuration for one aggregation pass.
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Maximum extractors in flight at once. Keeps a run with many resource
    /// types inside upstream rate limits.
    pub concurrency: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl AggregateConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Run every extractor for the window concurrently, bounded by the
/// configured concurrency, and assemble their outputs into one bundle.
///
/// Fail-fast: the first extractor error rejects the whole aggregation and
/// no partial bundle is returned.
pub async fn aggregate(
    extractors: &[Box<dyn Extractor>],
    window: &SyncWindow,
    config: &AggregateConfig,
) -> Result<Bundle> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

    let futures = extractors.iter().map(|extractor| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("semaphore never closed");

            let records = extractor.extract(window).await?;
            debug!(
                table = %extractor.spec().table,
                records = records.len(),
                "extractor finished"
            );
            Ok::<_, crate::error::EtlError>(ResourceSet::new(extractor.spec().clone(), records))
        }
    });

    let sets = try_join_all(futures).await?;
    Ok(Bundle::new(sets))
}
