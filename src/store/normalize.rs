//! Response shape normalization.
//!
//! List routes answer with a bare array, `{"meetings": [...]}` or
//! `{"data": [...]}`. Single-record routes answer with the object itself,
//! `{"meeting": {...}}` or `{"data": {...}}`. Everything past this module sees
//! canonical types only.

use serde_json::Value;

use crate::error::StoreError;
use crate::types::Meeting;

/// Extracts the meeting list from any accepted shape.
///
/// Unknown shapes yield an empty list; individual rows that fail to decode
/// are skipped rather than failing the whole list.
pub fn normalize_list(body: Value) -> Vec<Meeting> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match (map.remove("meetings"), map.remove("data")) {
            (Some(Value::Array(rows)), _) => rows,
            (_, Some(Value::Array(rows))) => rows,
            _ => {
                log::warn!("Meeting store: unrecognized list response shape, treating as empty");
                return Vec::new();
            }
        },
        _ => {
            log::warn!("Meeting store: list response is not an array or object");
            return Vec::new();
        }
    };

    let total = rows.len();
    let meetings: Vec<Meeting> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<Meeting>(row) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("Meeting store: skipping malformed meeting row: {}", e);
                None
            }
        })
        .collect();

    if meetings.len() < total {
        log::warn!(
            "Meeting store: decoded {} of {} meeting rows",
            meetings.len(),
            total
        );
    }
    meetings
}

/// Extracts one meeting from an insert/update response.
pub fn normalize_record(body: Value) -> Result<Meeting, StoreError> {
    let record = match body {
        Value::Object(mut map) if !map.contains_key("id") => map
            .remove("meeting")
            .or_else(|| map.remove("data"))
            .ok_or_else(|| StoreError::Decode("response carries no meeting record".to_string()))?,
        other => other,
    };

    serde_json::from_value(record).map_err(|e| StoreError::Decode(e.to_string()))
}
