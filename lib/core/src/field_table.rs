//! Static field table
//!
//! Built once from a validated [`ModelConfig`]. Coerces an open
//! [`ApplicationRecord`] into a [`TypedRecord`] whose slots follow the
//! declaration order of the configured fields.

use crate::config::{FieldSpec, FieldType, ModelConfig};
use crate::record::{json_kind, parse_datetime, ApplicationRecord, FieldValue};
use crate::{Error, Result};
use ahash::AHashMap;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
struct FieldEntry {
    spec: FieldSpec,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct FieldTable {
    entries: Vec<FieldEntry>,
    index: AHashMap<String, usize>,
}

/// Record coerced to declared types; `None` marks an absent optional field.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord {
    values: Vec<Option<FieldValue>>,
}

impl TypedRecord {
    #[inline]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index).and_then(Option::as_ref)
    }
}

impl FieldTable {
    pub fn build(config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let mut entries = Vec::with_capacity(config.fields.len());
        let mut index = AHashMap::with_capacity(config.fields.len());

        for (i, spec) in config.fields.iter().enumerate() {
            let pattern = spec
                .pattern
                .as_deref()
                .map(|p| {
                    Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                        let msg = format!("field '{}' has an invalid pattern: {}", spec.name, e);
                        Error::Config(msg)
                    })
                })
                .transpose()?;
            entries.push(FieldEntry { spec: spec.clone(), pattern });
            index.insert(spec.name.clone(), i);
        }

        Ok(Self { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn spec(&self, index: usize) -> &FieldSpec {
        &self.entries[index].spec
    }

    /// Declared fields in configuration order
    pub fn specs(&self) -> impl Iterator<Item = &FieldSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    /// Coerce every declared field; undeclared fields are ignored.
    pub fn coerce(&self, record: &ApplicationRecord) -> Result<TypedRecord> {
        let values = self
            .entries
            .iter()
            .map(|entry| coerce_field(entry, record.get(&entry.spec.name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(TypedRecord { values })
    }
}

fn coerce_field(entry: &FieldEntry, raw: Option<&Value>) -> Result<Option<FieldValue>> {
    let spec = &entry.spec;
    let Some(raw) = raw else {
        if spec.required {
            return Err(Error::encoding(&spec.name, "required field is missing"));
        }
        return Ok(None);
    };

    let value = match spec.field_type {
        FieldType::String => coerce_string(raw),
        FieldType::Integer => coerce_integer(raw),
        FieldType::Float => coerce_float(raw),
        FieldType::Boolean => coerce_boolean(raw),
        FieldType::Datetime => coerce_datetime(raw),
    }
    .ok_or_else(|| {
        Error::encoding(
            &spec.name,
            format!("cannot read {} as {:?}", json_kind(raw), spec.field_type).to_lowercase(),
        )
    })?;

    if let (Some(pattern), FieldValue::Text(text)) = (&entry.pattern, &value) {
        if !pattern.is_match(text.trim()) {
            return Err(Error::encoding(&spec.name, "value does not match the declared pattern"));
        }
    }

    Ok(Some(value))
}

fn coerce_string(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Number(n) => Some(FieldValue::Text(n.to_string())),
        Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
        _ => None,
    }
}

fn coerce_integer(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(FieldValue::Integer),
        Value::String(s) => s.trim().parse().ok().map(FieldValue::Integer),
        _ => None,
    }
}

fn coerce_float(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::Number(n) => n.as_f64().map(FieldValue::Float),
        Value::String(s) => {
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(FieldValue::Float)
        }
        _ => None,
    }
}

fn coerce_boolean(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(FieldValue::Boolean(false)),
            Some(1) => Some(FieldValue::Boolean(true)),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(FieldValue::Boolean(true)),
            "false" | "no" | "0" => Some(FieldValue::Boolean(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_datetime(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::String(s) => parse_datetime(s).map(FieldValue::DateTime),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(FieldValue::DateTime),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureGroup, SearchConfig, Thresholds, TransformerKind};
    use serde_json::json;

    fn config() -> ModelConfig {
        ModelConfig {
            name: "test".to_string(),
            description: None,
            fields: vec![
                FieldSpec::string("owner_ssn").with_pattern(r"\d{3}-\d{2}-\d{4}"),
                FieldSpec::string("website").optional(),
                FieldSpec::new("employees", FieldType::Integer, false),
                FieldSpec::new("is_online", FieldType::Boolean, false),
                FieldSpec::new("founded", FieldType::Datetime, false),
            ],
            feature_groups: vec![FeatureGroup::new(
                "identity",
                ["owner_ssn"],
                TransformerKind::hash(),
            )],
            embedding_dim: 4,
            similarity_thresholds: Thresholds::default(),
            reducer: None,
            search: SearchConfig::default(),
        }
    }

    fn record(value: serde_json::Value) -> ApplicationRecord {
        ApplicationRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_coerce_declared_fields() {
        let table = FieldTable::build(&config()).unwrap();
        let typed = table
            .coerce(&record(json!({
                "owner_ssn": "123-45-6789",
                "employees": "12",
                "is_online": "yes",
                "founded": "2020-01-01",
                "unrelated": {"nested": true}
            })))
            .unwrap();

        assert_eq!(typed.get(0), Some(&FieldValue::Text("123-45-6789".into())));
        assert_eq!(typed.get(1), None);
        assert_eq!(typed.get(2), Some(&FieldValue::Integer(12)));
        assert_eq!(typed.get(3), Some(&FieldValue::Boolean(true)));
        assert!(matches!(typed.get(4), Some(FieldValue::DateTime(_))));
    }

    #[test]
    fn test_missing_required_field() {
        let table = FieldTable::build(&config()).unwrap();
        let err = table.coerce(&record(json!({"website": "x.com"}))).unwrap_err();
        assert!(matches!(err, Error::Encoding { ref field, .. } if field == "owner_ssn"));
    }

    #[test]
    fn test_unencodable_value() {
        let table = FieldTable::build(&config()).unwrap();
        let err = table
            .coerce(&record(json!({"owner_ssn": "123-45-6789", "employees": "many"})))
            .unwrap_err();
        assert!(matches!(err, Error::Encoding { ref field, .. } if field == "employees"));

        let err = table
            .coerce(&record(json!({"owner_ssn": ["123-45-6789"]})))
            .unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn test_pattern_mismatch() {
        let table = FieldTable::build(&config()).unwrap();
        let err = table.coerce(&record(json!({"owner_ssn": "123456789"}))).unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let mut config = config();
        config.fields[1].pattern = Some("([".to_string());
        assert!(matches!(FieldTable::build(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_index_lookup() {
        let table = FieldTable::build(&config()).unwrap();
        assert_eq!(table.index_of("employees"), Some(2));
        assert_eq!(table.index_of("missing"), None);
        assert_eq!(table.len(), 5);
    }
}
