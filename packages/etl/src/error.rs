//! Typed errors for the ETL pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur during an ETL run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The upstream API returned an error envelope or a non-retryable
    /// non-success HTTP status.
    #[error("upstream API error: {message}")]
    Upstream {
        /// HTTP status, when the failure surfaced at the transport level.
        status: Option<u16>,
        /// The upstream error message, passed through verbatim.
        message: String,
    },

    /// Request deadline exceeded.
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// The whole run exceeded its configured deadline.
    #[error("run deadline exceeded after {limit:?}")]
    DeadlineExceeded { limit: std::time::Duration },

    /// Network-level failure after retries were exhausted.
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Response body was JSON but matched no known page envelope.
    #[error("unrecognized page envelope: {reason}")]
    Envelope { reason: String },

    /// A record is missing a column required by its table's conflict key.
    #[error("record for {table} is missing conflict-key column {column}")]
    MissingConflictKey { table: String, column: String },

    /// A table or column name failed the identifier guard.
    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    /// Destination read/write failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// One or more per-table upserts failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Bad runtime configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl EtlError {
    /// Wrap a storage backend error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EtlError::Storage(Box::new(err))
    }

    /// An upstream error with no HTTP status (error envelope in a 200 body).
    pub fn upstream(message: impl Into<String>) -> Self {
        EtlError::Upstream {
            status: None,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(err: sqlx::Error) -> Self {
        EtlError::storage(err)
    }
}

/// Aggregate error for a load pass: every table whose upsert failed, with
/// the underlying error. Tables not listed here were committed.
#[derive(Debug, Error)]
#[error("upsert failed for {} table(s): {}", .failures.len(), list_tables(.failures))]
pub struct LoadError {
    /// (table name, upsert error) per failed table.
    pub failures: Vec<(String, EtlError)>,
}

impl LoadError {
    /// Names of the tables that failed, in load order.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.failures.iter().map(|(t, _)| t.as_str()).collect()
    }
}

fn list_tables(failures: &[(String, EtlError)]) -> String {
    failures
        .iter()
        .map(|(table, _)| table.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_every_failed_table() {
        let err = LoadError {
            failures: vec![
                ("meta_ad_insights".into(), EtlError::upstream("boom")),
                ("rd_marketing_contatos".into(), EtlError::upstream("bang")),
            ],
        };

        let display = err.to_string();
        assert!(display.contains("2 table(s)"));
        assert!(display.contains("meta_ad_insights"));
        assert!(display.contains("rd_marketing_contatos"));
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = EtlError::MissingConflictKey {
            table: "ad_creatives".into(),
            column: "id".into(),
        };

        match &err {
            EtlError::MissingConflictKey { table, column } => {
                assert_eq!(table, "ad_creatives");
                assert_eq!(column, "id");
            }
            _ => panic!("expected MissingConflictKey"),
        }
    }

    #[test]
    fn test_upstream_display_carries_message() {
        let err = EtlError::Upstream {
            status: Some(400),
            message: "Invalid OAuth access token".into(),
        };
        assert!(err.to_string().contains("Invalid OAuth access token"));
    }
}
