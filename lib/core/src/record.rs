use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An inbound merchant application: an open mapping of field name to scalar.
///
/// `null` is treated the same as an absent field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ApplicationRecord(Map<String, Value>);

impl ApplicationRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(crate::Error::Serialization(format!(
                "application must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Raw value of a field, `None` when absent or null
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Display form of a scalar field used for exact comparisons.
    ///
    /// Empty strings, nulls and non-scalars have no display form.
    pub fn display_value(&self, field: &str) -> Option<String> {
        let text = match self.get(field)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ApplicationRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A field value coerced to its declared type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Trimmed, lowercased text used by hashing and vocabulary lookups
    pub fn canonical_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.trim().to_lowercase(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
        }
    }

    /// Numeric reading for scaling; datetimes become unix seconds
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::DateTime(dt) => Some(dt.timestamp() as f64),
        }
    }
}

/// Parse RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
