//! Raw JSON value to [`ParamValue`] conversions. Every function returns
//! `None` when the input cannot be coerced.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;
use validator::ValidateEmail;

use super::spec::ParamValue;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%B %d, %Y", "%d %B %Y"];

pub fn is_true_marker(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.as_str(), "true" | "True" | "1"),
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s == "0",
        _ => false,
    }
}

/// Values treated as "not supplied".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Raw value as shown in error messages. Strings lose their quotes.
pub fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn to_int(value: &Value) -> Option<ParamValue> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(ParamValue::Int),
        Value::String(s) => s.trim().parse().ok().map(ParamValue::Int),
        Value::Bool(b) => Some(ParamValue::Int(i64::from(*b))),
        _ => None,
    }
}

pub fn to_float(value: &Value) -> Option<ParamValue> {
    match value {
        Value::Number(n) => n.as_f64().map(ParamValue::Float),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(ParamValue::Float),
        Value::Bool(b) => Some(ParamValue::Float(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}

pub fn to_str(value: &Value) -> Option<ParamValue> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    };
    Some(ParamValue::Str(s))
}

/// `"['a','b']"` and `"a,b"` both become `["a", "b"]`.
pub fn to_list(value: &Value) -> Option<ParamValue> {
    match value {
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '[' | ']' | '\'' | '"'))
                .collect();
            Some(ParamValue::List(
                cleaned.split(',').map(|item| Value::String(item.to_string())).collect(),
            ))
        }
        Value::Array(items) => Some(ParamValue::List(items.clone())),
        _ => None,
    }
}

pub fn to_dict(value: &Value) -> Option<ParamValue> {
    match value {
        Value::String(s) => serde_json::from_str::<Value>(s).ok().map(ParamValue::Json),
        Value::Object(_) => Some(ParamValue::Json(value.clone())),
        _ => None,
    }
}

pub fn to_email(value: &Value) -> Option<ParamValue> {
    let candidate = value.as_str()?.trim().to_string();
    if candidate.validate_email() {
        Some(ParamValue::Str(candidate.to_lowercase()))
    } else {
        None
    }
}

/// Dates accept plain dates and full timestamps. Timestamps carrying an
/// offset are moved into the host timezone before the date is taken.
pub fn to_date(value: &Value, tz: FixedOffset) -> Option<ParamValue> {
    let s = value.as_str()?.trim();

    if let Some(aware) = parse_aware(s) {
        return Some(ParamValue::Date(aware.with_timezone(&tz).date_naive()));
    }
    if let Some(naive) = parse_naive_datetime(s) {
        return Some(ParamValue::Date(naive.date()));
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(ParamValue::Date)
}

/// Datetimes need a time component. Naive values are read as host local time.
pub fn to_datetime(value: &Value, tz: FixedOffset) -> Option<ParamValue> {
    let s = value.as_str()?.trim();

    if let Some(aware) = parse_aware(s) {
        return Some(ParamValue::DateTime(aware.with_timezone(&tz)));
    }
    let naive = parse_naive_datetime(s)?;
    tz.from_local_datetime(&naive)
        .single()
        .map(ParamValue::DateTime)
}

fn parse_aware(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        OFFSET_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    })
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
