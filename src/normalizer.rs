//! Event normalization
//!
//! This module turns untyped input records into canonical [`RawEvent`]s.
//! - Required fields checked on every record; any failure rejects the whole batch
//! - Timestamps parsed to UTC (naive timestamps are taken as UTC)
//! - Unknown event types kept as [`EventType::Other`]

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{ComputeError, FieldIssue, ValidationError};
use crate::types::{EventType, RawEvent};

/// Formats accepted for timestamps without an offset
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset timestamps outside RFC 3339: basic (`+0530`) or hour-only (`+05`)
/// offsets, `T` or space separated
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Date-only values, read as midnight UTC
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalizer for converting raw records to canonical events
pub struct EventNormalizer;

impl EventNormalizer {
    /// Parse a JSON array of records
    pub fn parse_array(json: &str) -> Result<Vec<Value>, ComputeError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Array(records) => Ok(records),
            other => Err(ComputeError::ParseError(format!(
                "expected a JSON array of events, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse NDJSON (one record per line, blank lines skipped)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Value>, ComputeError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Validate and canonicalize a batch, preserving input order
    pub fn normalize(records: &[Value]) -> Result<Vec<RawEvent>, ValidationError> {
        let mut events = Vec::with_capacity(records.len());
        let mut issues = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match normalize_record(index, record) {
                Ok(event) => events.push(event),
                Err(mut record_issues) => issues.append(&mut record_issues),
            }
        }

        if issues.is_empty() {
            Ok(events)
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Parse an ISO-8601 timestamp into a UTC instant
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalize_record(index: usize, record: &Value) -> Result<RawEvent, Vec<FieldIssue>> {
    let Some(fields) = record.as_object() else {
        return Err(vec![issue(index, "<record>", "must be a JSON object")]);
    };

    let mut issues = Vec::new();

    let user_id = match fields.get("user_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            issues.push(issue(index, "user_id", "must not be empty"));
            None
        }
        Some(Value::Null) | None => {
            issues.push(issue(index, "user_id", "is missing"));
            None
        }
        Some(_) => {
            issues.push(issue(index, "user_id", "must be a string"));
            None
        }
    };

    let event_type = match fields.get("event_type") {
        Some(Value::String(s)) => Some(EventType::parse(s.trim())),
        Some(Value::Null) | None => {
            issues.push(issue(index, "event_type", "is missing"));
            None
        }
        Some(_) => {
            issues.push(issue(index, "event_type", "must be a string"));
            None
        }
    };

    let timestamp = match fields.get("timestamp") {
        Some(Value::String(s)) => {
            let parsed = parse_timestamp(s);
            if parsed.is_none() {
                issues.push(issue(
                    index,
                    "timestamp",
                    &format!("is not a valid ISO-8601 instant: {s:?}"),
                ));
            }
            parsed
        }
        Some(Value::Null) | None => {
            issues.push(issue(index, "timestamp", "is missing"));
            None
        }
        Some(_) => {
            issues.push(issue(index, "timestamp", "must be a string"));
            None
        }
    };

    let lat = required_number(index, fields, "lat", &mut issues);
    let lon = required_number(index, fields, "lon", &mut issues);

    let accuracy = match fields.get("accuracy") {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            issues.push(issue(index, "accuracy", "must be a number"));
            None
        }
    };

    match (user_id, event_type, timestamp, lat, lon, accuracy) {
        (Some(user_id), Some(event_type), Some(timestamp), Some(lat), Some(lon), Some(accuracy))
            if issues.is_empty() =>
        {
            Ok(RawEvent {
                user_id,
                event_type,
                timestamp,
                lat,
                lon,
                accuracy,
            })
        }
        _ => Err(issues),
    }
}

fn required_number(
    index: usize,
    fields: &Map<String, Value>,
    name: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<f64> {
    match fields.get(name) {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => Some(v),
            _ => {
                issues.push(issue(index, name, "must be a finite number"));
                None
            }
        },
        Some(Value::Null) | None => {
            issues.push(issue(index, name, "is missing"));
            None
        }
        Some(_) => {
            issues.push(issue(index, name, "must be a number"));
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn issue(index: usize, field: &str, reason: &str) -> FieldIssue {
    FieldIssue {
        index,
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
