//! Feature encoder
//!
//! Turns an application into one raw vector by encoding every feature group
//! in configuration order and concatenating the results. Each group's
//! values are multiplied by the group weight.

use crate::transform::FieldTransform;
use fraudx_core::{
    ApplicationRecord, Error, FeatureGroup, FieldTable, ModelConfig, Result, TypedRecord,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Transforms of one feature group, in the group's field order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupEncoder {
    pub name: String,
    pub weight: f64,
    pub fields: Vec<String>,
    pub transforms: Vec<FieldTransform>,
}

impl GroupEncoder {
    fn unfitted(group: &FeatureGroup) -> Self {
        Self {
            name: group.name.clone(),
            weight: group.weight,
            fields: group.fields.clone(),
            transforms: group
                .fields
                .iter()
                .map(|_| FieldTransform::for_kind(&group.transformer))
                .collect(),
        }
    }

    fn matches(&self, group: &FeatureGroup) -> bool {
        self.name == group.name
            && self.weight == group.weight
            && self.fields == group.fields
            && self.transforms.iter().all(|t| t.matches_kind(&group.transformer))
    }

    /// Output width, `None` until every transform knows its width
    pub fn width(&self) -> Option<usize> {
        self.transforms.iter().map(FieldTransform::width).sum()
    }

    fn encode(&self, table: &FieldTable, typed: &TypedRecord, out: &mut Vec<f64>) -> Result<()> {
        let start = out.len();
        for (field, transform) in self.fields.iter().zip(&self.transforms) {
            let index = table.index_of(field).ok_or_else(|| {
                Error::Config(format!(
                    "group '{}' references unknown field '{}'",
                    self.name, field
                ))
            })?;
            transform.encode(field, typed.get(index), out)?;
        }
        for x in &mut out[start..] {
            *x *= self.weight;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    table: Arc<FieldTable>,
    groups: Vec<GroupEncoder>,
}

impl FeatureEncoder {
    /// Encoder with no learned parameters yet
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let table = Arc::new(FieldTable::build(config)?);
        let groups = config.feature_groups.iter().map(GroupEncoder::unfitted).collect();
        Ok(Self { table, groups })
    }

    /// Rebuild an encoder from previously fitted group parameters.
    pub fn from_parts(config: &ModelConfig, groups: Vec<GroupEncoder>) -> Result<Self> {
        let table = Arc::new(FieldTable::build(config)?);
        if groups.len() != config.feature_groups.len()
            || !groups.iter().zip(&config.feature_groups).all(|(g, spec)| g.matches(spec))
        {
            return Err(Error::Config(
                "fitted group parameters do not match the configured feature groups".into(),
            ));
        }
        Ok(Self { table, groups })
    }

    /// Fit every transform over `corpus`.
    ///
    /// Records that fail to coerce are skipped. The coerced records that were
    /// kept are returned alongside the encoder.
    pub fn fit(
        config: &ModelConfig,
        corpus: &[ApplicationRecord],
    ) -> Result<(Self, Vec<TypedRecord>)> {
        let mut encoder = Self::new(config)?;

        let typed: Vec<TypedRecord> = corpus
            .par_iter()
            .enumerate()
            .filter_map(|(i, record)| match encoder.table.coerce(record) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(row = i, error = %e, "Skipping training record");
                    None
                }
            })
            .collect();

        if typed.is_empty() {
            return Err(Error::Fit(format!(
                "no usable records in a training corpus of {}",
                corpus.len()
            )));
        }

        let table = encoder.table.clone();
        for group in &mut encoder.groups {
            for (field, transform) in group.fields.iter().zip(group.transforms.iter_mut()) {
                let index = table
                    .index_of(field)
                    .ok_or_else(|| Error::Config(format!("unknown field '{}'", field)))?;
                let column: Vec<_> = typed.iter().map(|t| t.get(index)).collect();
                transform.fit(&column);
            }
            debug!(group = %group.name, width = ?group.width(), "Fitted feature group");
        }

        Ok((encoder, typed))
    }

    pub fn table(&self) -> &Arc<FieldTable> {
        &self.table
    }

    pub fn groups(&self) -> &[GroupEncoder] {
        &self.groups
    }

    pub fn is_fitted(&self) -> bool {
        self.groups.iter().all(|g| g.transforms.iter().all(FieldTransform::is_fitted))
    }

    /// Width of the concatenated raw vector
    pub fn raw_dim(&self) -> Result<usize> {
        self.groups
            .iter()
            .map(|g| {
                g.width()
                    .ok_or_else(|| Error::not_fitted(format!("feature group '{}'", g.name)))
            })
            .sum()
    }

    /// One vector per feature group, already weighted
    pub fn encode_groups(&self, record: &ApplicationRecord) -> Result<Vec<Vec<f64>>> {
        let typed = self.table.coerce(record)?;
        self.groups
            .iter()
            .map(|group| {
                let mut out = Vec::new();
                group.encode(&self.table, &typed, &mut out)?;
                Ok(out)
            })
            .collect()
    }

    pub fn encode(&self, record: &ApplicationRecord) -> Result<Vec<f64>> {
        let typed = self.table.coerce(record)?;
        self.encode_typed(&typed)
    }

    pub fn encode_typed(&self, typed: &TypedRecord) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.raw_dim().unwrap_or(0));
        for group in &self.groups {
            group.encode(&self.table, typed, &mut out)?;
        }
        Ok(out)
    }
}
