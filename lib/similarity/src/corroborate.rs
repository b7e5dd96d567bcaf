//! Corroboration of vector candidates
//!
//! A nearest neighbour is only evidence once concrete identifying values
//! agree. Every configured field present in both the new application and the
//! candidate's snapshot is compared exactly, ignoring case and surrounding
//! whitespace.

use crate::decision::{FieldMatch, MatchCandidate};
use fraudx_core::{ApplicationRecord, ModelConfig, StoreHit};

#[derive(Debug, Clone)]
pub struct Corroborator {
    /// Compared fields, in declaration order
    fields: Vec<String>,
}

impl Corroborator {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            fields: config.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Fields whose values agree in both records
    pub fn matching_fields(
        &self,
        record: &ApplicationRecord,
        snapshot: &ApplicationRecord,
    ) -> Vec<FieldMatch> {
        self.fields
            .iter()
            .filter_map(|field| {
                let new_value = record.display_value(field)?;
                let fraud_value = snapshot.display_value(field)?;
                (new_value.to_lowercase() == fraud_value.to_lowercase())
                    .then(|| FieldMatch::exact(field.as_str(), new_value, fraud_value))
            })
            .collect()
    }

    /// Turn ordered store hits into candidates, keeping their order.
    ///
    /// With `require_match`, hits without a single matching field are dropped.
    pub fn corroborate(
        &self,
        record: &ApplicationRecord,
        hits: Vec<StoreHit>,
        require_match: bool,
    ) -> Vec<MatchCandidate> {
        hits.into_iter()
            .filter_map(|hit| {
                let matching_fields = self.matching_fields(record, &hit.application);
                if require_match && matching_fields.is_empty() {
                    return None;
                }
                Some(MatchCandidate {
                    merchant_id: hit.merchant_id,
                    vector_similarity: hit.similarity,
                    fraud_reason: hit.fraud_reason,
                    matching_fields,
                })
            })
            .collect()
    }
}
