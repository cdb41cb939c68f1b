//! Per-resource extractors.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Record, ResourceSpec, SyncWindow};

/// One extractor per resource type. An extractor builds its own
/// fully-parameterized first-page request (field list, metric list, time
/// range) and delegates pagination to the fetcher.
///
/// Extractors are stateless and independent; none depends on another's
/// output.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Destination table and conflict key for the records this extractor
    /// produces.
    fn spec(&self) -> &ResourceSpec;

    /// Fetch every record for the window.
    async fn extract(&self, window: &SyncWindow) -> Result<Vec<Record>>;
}
