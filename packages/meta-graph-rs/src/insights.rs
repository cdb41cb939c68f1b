//! Flattening for Graph insights payloads.
//!
//! Page and Instagram insights nest daily points inside each metric entry:
//!
//! ```json
//! {
//!   "name": "page_impressions",
//!   "period": "day",
//!   "values": [{"value": 120, "end_time": "2024-03-02T07:00:00+0000"}]
//! }
//! ```
//!
//! The warehouse wants one row per (scope, metric, point), so each value
//! becomes its own record carrying the metric name and the owning scope id.

use etl::Record;
use serde_json::{json, Value};

/// Flatten a batch of Graph insight entries into per-point records.
///
/// `scope_column`/`scope_id` identify the owner (page or Instagram
/// account); entries without a name or values are dropped.
pub fn flatten_insights(entries: Vec<Record>, scope_column: &str, scope_id: &str) -> Vec<Record> {
    let mut records = Vec::new();

    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let period = entry
            .get("period")
            .and_then(Value::as_str)
            .unwrap_or("day")
            .to_string();
        let Some(values) = entry.get("values").and_then(Value::as_array) else {
            continue;
        };

        for point in values {
            let Some(end_time) = point.get("end_time").and_then(Value::as_str) else {
                continue;
            };
            records.push(json!({
                scope_column: scope_id,
                "metric": name,
                "period": period,
                "end_time": end_time,
                "value": point.get("value").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    records
}
