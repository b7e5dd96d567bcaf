//! Training corpus loading
//!
//! Accepts a JSON array (plain records, or `{merchant_id, application,
//! fraud_reason}` wrappers) or a CSV file with a header row. The
//! `merchant_id` and `fraud_reason` columns are lifted out of the
//! application; a missing merchant_id gets a random UUID.

use anyhow::{bail, Context, Result};
use fraudx_core::ApplicationRecord;
use serde_json::{Map, Value};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::info;

const MERCHANT_ID: &str = "merchant_id";
const FRAUD_REASON: &str = "fraud_reason";
const APPLICATION: &str = "application";

/// One corpus row
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledApplication {
    pub merchant_id: String,
    pub application: ApplicationRecord,
    pub fraud_reason: Option<String>,
}

impl LabeledApplication {
    fn from_fields(mut fields: Map<String, Value>) -> Self {
        let merchant_id = fields
            .remove(MERCHANT_ID)
            .and_then(|v| scalar_text(&v))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let fraud_reason = fields.remove(FRAUD_REASON).and_then(|v| scalar_text(&v));
        Self {
            merchant_id,
            application: ApplicationRecord::from(fields),
            fraud_reason,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Load a corpus file, choosing the parser by extension.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledApplication>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let rows = if is_csv {
        let file = fs::File::open(path)
            .with_context(|| format!("opening corpus {}", path.display()))?;
        read_csv_corpus(file)?
    } else {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading corpus {}", path.display()))?;
        parse_json_corpus(&text)?
    };

    info!(path = %path.display(), rows = rows.len(), "Loaded training corpus");
    Ok(rows)
}

pub fn parse_json_corpus(text: &str) -> Result<Vec<LabeledApplication>> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        bail!("corpus must be a JSON array of applications");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(mut fields) => {
                if let Some(Value::Object(application)) = fields.remove(APPLICATION) {
                    let mut wrapped = application;
                    for key in [MERCHANT_ID, FRAUD_REASON] {
                        if let Some(v) = fields.remove(key) {
                            wrapped.insert(key.to_string(), v);
                        }
                    }
                    fields = wrapped;
                }
                Ok(LabeledApplication::from_fields(fields))
            }
            other => bail!("corpus entry {} is not an object: {}", i, other),
        })
        .collect()
}

/// Empty cells are treated as absent values.
pub fn read_csv_corpus<R: Read>(reader: R) -> Result<Vec<LabeledApplication>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to parse CSV headers")?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if headers.is_empty() {
        bail!("CSV corpus has no headers");
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", idx + 2))?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(name, cell)| (name.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(LabeledApplication::from_fields(fields));
    }
    Ok(rows)
}
