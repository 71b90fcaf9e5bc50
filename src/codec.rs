//! Conversion between native field values and the text exchanged with the LM.
//!
//! Scalar kinds convert in both directions without outside help. Relation
//! kinds need the candidate list of the related class, see [`relation`].
use crate::error::WorkflowError;
use crate::schema::{FieldKind, NativeValue};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub mod relation;

/// Canonical timestamp layout used for every date-time rendered as text.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "on"];

const DATETIME_FORMATS: &[&str] = &[
    CANONICAL_DATETIME_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d %B %Y %H:%M",
    "%B %d, %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
];

/// Convert LM text into the native value for a scalar field kind.
///
/// Blank input clears non-text fields. Relation kinds are refused here.
pub fn human_to_native(kind: &FieldKind, text: &str) -> Result<NativeValue> {
    let trimmed = text.trim();
    match kind {
        FieldKind::ShortText | FieldKind::LongText | FieldKind::RichText => {
            Ok(NativeValue::Text(text.to_string()))
        }
        _ if trimmed.is_empty() => Ok(NativeValue::Null),
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(NativeValue::Integer)
            .map_err(|err| invalid(kind, trimmed, &err.to_string())),
        FieldKind::Float => match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(NativeValue::Float(value)),
            Ok(_) => Err(invalid(kind, trimmed, "not a finite number")),
            Err(err) => Err(invalid(kind, trimmed, &err.to_string())),
        },
        FieldKind::Boolean => {
            let lowered = trimmed.to_ascii_lowercase();
            Ok(NativeValue::Boolean(TRUE_WORDS.contains(&lowered.as_str())))
        }
        FieldKind::DateTime => parse_datetime(trimmed)
            .map(NativeValue::DateTime)
            .ok_or_else(|| invalid(kind, trimmed, "unrecognized date format")),
        FieldKind::HasOne { .. } | FieldKind::HasMany { .. } => Err(WorkflowError::Validation(
            format!("{kind} values must be decoded against a candidate list"),
        )
        .into()),
    }
}

/// Render a native value in the human form shown to the LM and reviewers.
pub fn native_to_human(value: &NativeValue) -> String {
    match value {
        NativeValue::Null => String::new(),
        NativeValue::Text(text) => text.clone(),
        NativeValue::Integer(value) => value.to_string(),
        NativeValue::Float(value) => value.to_string(),
        NativeValue::Boolean(true) => "Yes".to_string(),
        NativeValue::Boolean(false) => "No".to_string(),
        NativeValue::DateTime(value) => value.format(CANONICAL_DATETIME_FORMAT).to_string(),
        NativeValue::Ref(id) => id.to_string(),
        NativeValue::Refs(ids) => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Parse a date or date-time written in any of the accepted layouts.
///
/// Date-only input resolves to midnight. Offsets are dropped after
/// conversion to UTC.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn invalid(kind: &FieldKind, text: &str, detail: &str) -> anyhow::Error {
    WorkflowError::Validation(format!("cannot read {text:?} as {kind}: {detail}")).into()
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
