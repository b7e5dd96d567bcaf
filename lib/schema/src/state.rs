//! Fitted encoder state
//!
//! Everything learned from a training corpus, frozen. A state is built in
//! full by [`FittedEncoderState::fit`] (or restored from an artifact) before
//! anything can read it, and it is never mutated afterwards.

use crate::encoder::{FeatureEncoder, GroupEncoder};
use crate::reducer::{fit_length, PcaReducer, Projection};
use fraudx_core::{ApplicationRecord, Error, ModelConfig, Result, Vector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Version of the canonical pipeline: hash function, transform semantics,
/// group concatenation and reduction. Embeddings from different versions are
/// not comparable.
pub const PIPELINE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineInfo {
    pub pipeline_version: u32,
    /// Unix seconds
    pub fitted_at: i64,
    pub corpus_size: usize,
    pub skipped_records: usize,
    pub raw_dim: usize,
}

/// The learned parameters, separate from configuration so they can be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FittedParameters {
    pub groups: Vec<GroupEncoder>,
    pub projection: Option<Projection>,
}

#[derive(Debug, Clone)]
pub struct FittedEncoderState {
    config: ModelConfig,
    encoder: FeatureEncoder,
    reducer: Option<PcaReducer>,
    info: PipelineInfo,
}

impl FittedEncoderState {
    /// Fit encoder and reducer over a training corpus.
    pub fn fit(config: &ModelConfig, corpus: &[ApplicationRecord]) -> Result<Self> {
        let (encoder, typed) = FeatureEncoder::fit(config, corpus)?;
        let raw_dim = encoder.raw_dim()?;

        let reducer = match &config.reducer {
            Some(reducer_config) => {
                let rows = typed
                    .par_iter()
                    .map(|t| encoder.encode_typed(t))
                    .collect::<Result<Vec<_>>>()?;
                let mut reducer =
                    PcaReducer::new(reducer_config.max_components(config.embedding_dim));
                let projection = reducer.fit(&rows)?;
                info!(
                    raw_dim,
                    components = projection.output_dim(),
                    "Fitted dimensionality reducer"
                );
                Some(reducer)
            }
            None => None,
        };

        let info = PipelineInfo {
            pipeline_version: PIPELINE_VERSION,
            fitted_at: chrono::Utc::now().timestamp(),
            corpus_size: typed.len(),
            skipped_records: corpus.len() - typed.len(),
            raw_dim,
        };
        info!(
            corpus_size = info.corpus_size,
            skipped = info.skipped_records,
            raw_dim,
            embedding_dim = config.embedding_dim,
            "Fitted encoder state"
        );

        Ok(Self {
            config: config.clone(),
            encoder,
            reducer,
            info,
        })
    }

    /// Rebuild a state from persisted parameters.
    ///
    /// A configured reducer without a persisted projection is kept unfitted,
    /// so assembly reports it as such.
    pub fn restore(
        config: ModelConfig,
        parameters: FittedParameters,
        info: PipelineInfo,
    ) -> Result<Self> {
        if info.pipeline_version != PIPELINE_VERSION {
            return Err(Error::Config(format!(
                "fitted state uses pipeline version {}, this build runs version {}",
                info.pipeline_version, PIPELINE_VERSION
            )));
        }

        let encoder = FeatureEncoder::from_parts(&config, parameters.groups)?;

        let reducer = match (&config.reducer, parameters.projection) {
            (Some(reducer_config), projection) => {
                let max = reducer_config.max_components(config.embedding_dim);
                if let Some(p) = &projection {
                    let raw_dim = encoder.raw_dim()?;
                    if p.input_dim() != raw_dim || p.output_dim() > max {
                        return Err(Error::Config(format!(
                            "projection {}x{} does not fit raw width {} with at most {} components",
                            p.output_dim(),
                            p.input_dim(),
                            raw_dim,
                            max
                        )));
                    }
                }
                Some(PcaReducer::from_projection(max, projection))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "fitted state carries a projection but no reducer is configured".into(),
                ))
            }
            (None, None) => None,
        };

        Ok(Self {
            config,
            encoder,
            reducer,
            info,
        })
    }

    pub fn parameters(&self) -> FittedParameters {
        FittedParameters {
            groups: self.encoder.groups().to_vec(),
            projection: self.reducer.as_ref().and_then(|r| r.projection().cloned()),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn info(&self) -> &PipelineInfo {
        &self.info
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn reducer(&self) -> Option<&PcaReducer> {
        self.reducer.as_ref()
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    /// Concatenated, weighted group vectors before reduction
    pub fn raw_vector(&self, record: &ApplicationRecord) -> Result<Vec<f64>> {
        self.encoder.encode(record)
    }

    /// The embedding of `record`: encode, reduce or pad/truncate, cast to f32.
    pub fn assemble(&self, record: &ApplicationRecord) -> Result<Vector> {
        let raw = self.raw_vector(record)?;
        let reduced = match &self.reducer {
            Some(reducer) => reducer.transform(&raw)?,
            None => raw,
        };

        let dim = self.embedding_dim();
        let data: Vec<f32> = fit_length(reduced, dim).into_iter().map(|x| x as f32).collect();
        if data.len() != dim {
            return Err(Error::InvalidDimension {
                expected: dim,
                actual: data.len(),
            });
        }
        Ok(Vector::new(data))
    }
}
