//! Page envelope normalization.
//!
//! Upstream APIs wrap collection pages in different envelopes. The fetcher
//! normalizes them all to a flat record batch plus an optional next-page
//! pointer, so extractors never know which shape was in play:
//!
//! - graph-style: `{ "data": [...], "paging": { "next": "url" } }`
//! - collection-style: `{ "items": [...], "next_page_url": "url" | null }`
//! - bare array: `[...]` (single page)

use serde_json::Value;

use crate::error::{EtlError, Result};

/// One record as returned by an upstream API: an opaque JSON object the
/// pipeline passes through without interpreting.
pub type Record = Value;

/// A normalized page: one batch of records plus the pointer to the next
/// page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    pub next: Option<String>,
}

impl Page {
    /// Normalize a raw response body into a `Page`.
    ///
    /// An upstream error envelope (`{"error": {...}}` or `{"errors": ...}`)
    /// is rejected as [`EtlError::Upstream`] carrying the upstream message.
    /// A body that is JSON but matches no known envelope is
    /// [`EtlError::Envelope`].
    pub fn from_value(body: Value) -> Result<Page> {
        if let Some(message) = error_envelope_message(&body) {
            return Err(EtlError::upstream(message));
        }

        match body {
            Value::Array(records) => Ok(Page {
                records,
                next: None,
            }),
            Value::Object(mut obj) => {
                if let Some(data) = obj.remove("data") {
                    let records = as_record_batch(data, "data")?;
                    let next = obj
                        .get("paging")
                        .and_then(|p| p.get("next"))
                        .and_then(Value::as_str)
                        .and_then(non_empty);
                    return Ok(Page { records, next });
                }

                if let Some(items) = obj.remove("items") {
                    let records = as_record_batch(items, "items")?;
                    let next = obj
                        .get("next_page_url")
                        .and_then(Value::as_str)
                        .and_then(non_empty);
                    return Ok(Page { records, next });
                }

                Err(EtlError::Envelope {
                    reason: format!(
                        "object has neither \"data\" nor \"items\" (keys: {})",
                        obj.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                })
            }
            other => Err(EtlError::Envelope {
                reason: format!("expected object or array, got {}", type_name(&other)),
            }),
        }
    }

    /// Whether this page carries a pointer to another page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Pull the message out of an upstream error envelope, if the body is one.
fn error_envelope_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;

    if let Some(error) = obj.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(message);
    }

    if let Some(errors) = obj.get("errors") {
        return Some(errors.to_string());
    }

    None
}

fn as_record_batch(value: Value, field: &str) -> Result<Vec<Record>> {
    match value {
        Value::Array(records) => Ok(records),
        other => Err(EtlError::Envelope {
            reason: format!("\"{}\" is {}, not an array", field, type_name(&other)),
        }),
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
