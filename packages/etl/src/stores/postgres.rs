//! Postgres `MetricStore` backed by `sqlx`.
//!
//! Records are untyped pass-through JSON objects, so the upsert routes them
//! through `jsonb_populate_recordset`, which maps each object onto the
//! destination table's declared column types. The column list is derived
//! from the records themselves; every identifier is validated before it is
//! interpolated into SQL.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::traits::MetricStore;
use crate::types::{Record, ResourceSet};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A bare SQL identifier: starts with a letter or underscore, continues
/// with letters, digits, or underscores. Anything else is rejected rather
/// than quoted.
fn check_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(EtlError::InvalidIdentifier(name.to_string()))
    }
}

/// Union of the column names appearing across a record batch, sorted.
fn columns_of(records: &[Record]) -> Vec<String> {
    let mut columns = BTreeSet::new();
    for record in records {
        if let Some(obj) = record.as_object() {
            columns.extend(obj.keys().cloned());
        }
    }
    columns.into_iter().collect()
}

/// Build the upsert statement for one resource set.
///
/// The record batch binds as one JSONB parameter; non-key columns are
/// overwritten from `EXCLUDED` so re-loading the same bundle converges on
/// the same row state.
fn build_upsert_sql(table: &str, columns: &[String], conflict_key: &[String]) -> Result<String> {
    let table = check_identifier(table)?;
    for column in columns {
        check_identifier(column)?;
    }
    for key in conflict_key {
        check_identifier(key)?;
        if !columns.iter().any(|c| c == key) {
            return Err(EtlError::MissingConflictKey {
                table: table.to_string(),
                column: key.clone(),
            });
        }
    }

    let column_list = columns.join(", ");
    let key_list = conflict_key.join(", ");
    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_key.contains(c))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    let conflict_action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    Ok(format!(
        "INSERT INTO {table} ({column_list}) \
         SELECT {column_list} FROM jsonb_populate_recordset(NULL::{table}, $1) \
         ON CONFLICT ({key_list}) {conflict_action}"
    ))
}

#[async_trait]
impl MetricStore for PostgresStore {
    async fn upsert(&self, set: &ResourceSet) -> Result<u64> {
        if set.is_empty() {
            return Ok(0);
        }

        set.require_conflict_keys()?;

        let columns = columns_of(&set.records);
        let sql = build_upsert_sql(&set.spec.table, &columns, &set.spec.conflict_key)?;

        let result = sqlx::query(&sql)
            .bind(Value::Array(set.records.clone()))
            .execute(&self.pool)
            .await?;

        debug!(
            table = %set.spec.table,
            rows = result.rows_affected(),
            "upsert committed"
        );

        Ok(result.rows_affected())
    }

    async fn last_synced_at(&self, integration: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT last_synced_at FROM etl_sync_state WHERE integration = $1",
        )
        .bind(integration)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("last_synced_at")))
    }

    async fn record_sync(&self, integration: &str, synced_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO etl_sync_state (integration, last_synced_at, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (integration) DO UPDATE
                SET last_synced_at = EXCLUDED.last_synced_at, updated_at = now()
            "#,
        )
        .bind(integration)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_guard() {
        assert!(check_identifier("meta_ad_insights").is_ok());
        assert!(check_identifier("_private").is_ok());
        assert!(check_identifier("col2").is_ok());

        assert!(check_identifier("").is_err());
        assert!(check_identifier("2col").is_err());
        assert!(check_identifier("bad-name").is_err());
        assert!(check_identifier("t; DROP TABLE x").is_err());
        assert!(check_identifier("\"quoted\"").is_err());
    }

    #[test]
    fn test_columns_union_is_sorted() {
        let records = vec![
            json!({"b": 1, "a": 2}),
            json!({"c": 3, "a": 4}),
        ];
        assert_eq!(columns_of(&records), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_upsert_sql_shape() {
        let columns = vec!["ad_id".to_string(), "clicks".to_string(), "date_start".to_string()];
        let keys = vec!["ad_id".to_string(), "date_start".to_string()];

        let sql = build_upsert_sql("meta_ad_insights", &columns, &keys).unwrap();

        assert_eq!(
            sql,
            "INSERT INTO meta_ad_insights (ad_id, clicks, date_start) \
             SELECT ad_id, clicks, date_start \
             FROM jsonb_populate_recordset(NULL::meta_ad_insights, $1) \
             ON CONFLICT (ad_id, date_start) DO UPDATE SET clicks = EXCLUDED.clicks"
        );
    }

    #[test]
    fn test_upsert_sql_all_key_columns_does_nothing_on_conflict() {
        let columns = vec!["id".to_string()];
        let keys = vec!["id".to_string()];

        let sql = build_upsert_sql("ad_creatives", &columns, &keys).unwrap();
        assert!(sql.ends_with("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_upsert_sql_rejects_key_absent_from_records() {
        let columns = vec!["name".to_string()];
        let keys = vec!["id".to_string()];

        let err = build_upsert_sql("ad_creatives", &columns, &keys).unwrap_err();
        assert!(matches!(err, EtlError::MissingConflictKey { .. }));
    }

    #[test]
    fn test_upsert_sql_rejects_hostile_identifiers() {
        let columns = vec!["id".to_string()];
        let keys = vec!["id".to_string()];

        let err = build_upsert_sql("x; DROP TABLE y", &columns, &keys).unwrap_err();
        assert!(matches!(err, EtlError::InvalidIdentifier(_)));
    }
}
