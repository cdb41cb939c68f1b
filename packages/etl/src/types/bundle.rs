//! Resource specs, resource sets, and the per-run bundle.

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::types::page::Record;

/// Where a resource type lands in the warehouse: the destination table and
/// the ordered column set that uniquely identifies a record there.
///
/// Conflict keys are declared at the extractor, not derived from the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Destination table name.
    pub table: String,
    /// Columns whose values identify a record for insert-or-update.
    pub conflict_key: Vec<String>,
}

impl ResourceSpec {
    pub fn new<I, S>(table: impl Into<String>, conflict_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            conflict_key: conflict_key.into_iter().map(Into::into).collect(),
        }
    }
}

/// The records fetched for one resource type in one run, together with
/// their destination.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    pub spec: ResourceSpec,
    pub records: Vec<Record>,
}

impl ResourceSet {
    pub fn new(spec: ResourceSpec, records: Vec<Record>) -> Self {
        Self { spec, records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Verify that every record carries a non-null value for each
    /// conflict-key column. Stores call this before issuing any write.
    pub fn require_conflict_keys(&self) -> Result<()> {
        for record in &self.records {
            for column in &self.spec.conflict_key {
                let present = record
                    .get(column)
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !present {
                    return Err(EtlError::MissingConflictKey {
                        table: self.spec.table.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Everything one aggregation run produced: one `ResourceSet` per extractor,
/// in dispatch order. Consumed by exactly one load pass.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub sets: Vec<ResourceSet>,
}

impl Bundle {
    pub fn new(sets: Vec<ResourceSet>) -> Self {
        Self { sets }
    }

    /// Total records across all resource types.
    pub fn record_count(&self) -> usize {
        self.sets.iter().map(ResourceSet::len).sum()
    }

    /// True when every resource set came back empty.
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(ResourceSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_counts() {
        let bundle = Bundle::new(vec![
            ResourceSet::new(
                ResourceSpec::new("ad_creatives", ["id"]),
                vec![json!({"id": "c1"}), json!({"id": "c2"})],
            ),
            ResourceSet::new(ResourceSpec::new("meta_campaigns", ["id"]), vec![]),
        ]);

        assert_eq!(bundle.record_count(), 2);
        assert!(!bundle.is_empty());
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = Bundle::new(vec![ResourceSet::new(
            ResourceSpec::new("meta_campaigns", ["id"]),
            vec![],
        )]);
        assert!(bundle.is_empty());
        assert_eq!(bundle.record_count(), 0);
    }
}
