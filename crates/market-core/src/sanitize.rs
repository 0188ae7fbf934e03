//! Conversion of loosely typed provider data into JSON-safe values.
//!
//! Provider payloads are decoded into [`RawValue`] trees, which may carry dates, non-string
//! map keys and non-finite floats. [`sanitize`] flattens them into a `serde_json::Value`
//! that always serializes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};

const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Map key before coercion to a string
#[derive(Debug, Clone, PartialEq)]
pub enum RawKey {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    NaiveDateTime(NaiveDateTime),
}

/// Arbitrary nested value as decoded from an upstream provider
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    NaiveDateTime(NaiveDateTime),
    Seq(Vec<RawValue>),
    /// Insertion-ordered entries; later duplicates of a key win
    Map(Vec<(RawKey, RawValue)>),
}

impl RawKey {
    fn canonical(&self) -> String {
        match self {
            RawKey::String(s) => s.clone(),
            RawKey::Int(i) => i.to_string(),
            RawKey::Float(f) => f.to_string(),
            RawKey::Bool(b) => b.to_string(),
            RawKey::Date(d) => d.format("%Y-%m-%d").to_string(),
            RawKey::DateTime(dt) => dt.to_rfc3339(),
            RawKey::NaiveDateTime(dt) => dt.format(NAIVE_DATETIME_FORMAT).to_string(),
        }
    }
}

/// Recursively convert a raw value into a JSON-safe value.
///
/// Non-finite floats become `null`, dates become ISO-8601 strings and every map key is
/// stringified. Pure and idempotent.
pub fn sanitize(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::Number((*i).into()),
        RawValue::UInt(u) => Value::Number((*u).into()),
        RawValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        RawValue::String(s) => Value::String(s.clone()),
        RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        RawValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        RawValue::NaiveDateTime(dt) => Value::String(dt.format(NAIVE_DATETIME_FORMAT).to_string()),
        RawValue::Seq(items) => Value::Array(items.iter().map(sanitize).collect()),
        RawValue::Map(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                map.insert(key.canonical(), sanitize(item));
            }
            Value::Object(map)
        }
    }
}

/// Serialize any value to JSON, nulling out anything that is not representable.
///
/// serde_json already writes non-finite `f64` fields as `null`; going through [`RawValue`]
/// makes the guarantee independent of the caller's types.
pub fn to_safe_json<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    let value = serde_json::to_value(value)?;
    Ok(sanitize(&RawValue::from(value)))
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    RawValue::UInt(u)
                } else {
                    n.as_f64().map_or(RawValue::Null, RawValue::Float)
                }
            }
            Value::String(s) => RawValue::String(s),
            Value::Array(items) => RawValue::Seq(items.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Map(
                map.into_iter()
                    .map(|(k, v)| (RawKey::String(k), RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(value: DateTime<Utc>) -> Self {
        RawValue::DateTime(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

impl From<&str> for RawKey {
    fn from(value: &str) -> Self {
        RawKey::String(value.to_string())
    }
}

impl From<NaiveDate> for RawKey {
    fn from(value: NaiveDate) -> Self {
        RawKey::Date(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn nested_sample() -> RawValue {
        RawValue::Map(vec![
            (RawKey::Int(7), RawValue::Float(f64::INFINITY)),
            (
                RawKey::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
                RawValue::Seq(vec![
                    RawValue::Float(1.5),
                    RawValue::Float(f64::NEG_INFINITY),
                    RawValue::Date(date(2023, 12, 29)),
                    RawValue::Map(vec![(RawKey::Bool(true), RawValue::Float(f64::NAN))]),
                ]),
            ),
            (
                RawKey::from("when"),
                RawValue::NaiveDateTime(date(2024, 5, 6).and_hms_opt(9, 15, 0).unwrap()),
            ),
            (RawKey::from("count"), RawValue::UInt(u64::MAX)),
        ])
    }

    #[test]
    fn test_date_keys_and_nan_values() {
        let raw = RawValue::Map(vec![
            (RawKey::from(date(2024, 1, 1)), RawValue::Float(3.0)),
            (RawKey::from("x"), RawValue::Float(f64::NAN)),
        ]);

        assert_eq!(sanitize(&raw), json!({"2024-01-01": 3.0, "x": null}));
    }

    #[test]
    fn test_nested_values_are_cleaned() {
        let clean = sanitize(&nested_sample());

        assert_eq!(clean["7"], Value::Null);
        let seq = &clean["2024-03-01T12:30:00+00:00"];
        assert_eq!(seq[0], json!(1.5));
        assert_eq!(seq[1], Value::Null);
        assert_eq!(seq[2], json!("2023-12-29"));
        assert_eq!(seq[3], json!({"true": null}));
        assert_eq!(clean["when"], json!("2024-05-06T09:15:00"));
        assert_eq!(clean["count"], json!(u64::MAX));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize(&nested_sample());
        let twice = sanitize(&RawValue::from(once.clone()));
        assert_eq!(once, twice);

        let scalar = sanitize(&RawValue::Float(f64::NAN));
        assert_eq!(sanitize(&RawValue::from(scalar.clone())), scalar);
    }

    #[test]
    fn test_later_duplicate_key_wins() {
        let raw = RawValue::Map(vec![
            (RawKey::Int(1), RawValue::from("first")),
            (RawKey::from("1"), RawValue::from("second")),
        ]);
        assert_eq!(sanitize(&raw), json!({"1": "second"}));
    }

    #[test]
    fn test_sequences_keep_order() {
        let raw = RawValue::Seq(vec![RawValue::Int(3), RawValue::Int(1), RawValue::Int(2)]);
        assert_eq!(sanitize(&raw), json!([3, 1, 2]));
    }

    #[test]
    fn test_to_safe_json_on_struct() {
        #[derive(Serialize)]
        struct Sample {
            price: f64,
            name: &'static str,
        }

        let value = to_safe_json(&Sample {
            price: f64::NAN,
            name: "ACME",
        })
        .unwrap();
        assert_eq!(value, json!({"price": null, "name": "ACME"}));
    }
}
