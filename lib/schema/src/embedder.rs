//! Structured Embedder
//!
//! Serving entry point of the embedding pipeline. Holds the currently
//! published [`FittedEncoderState`] and swaps it atomically when a re-fit
//! completes. A request clones the `Arc` once and assembles against that
//! snapshot, so it never sees a half-published state.

use crate::state::FittedEncoderState;
use fraudx_core::{ApplicationRecord, Error, ModelConfig, Result, Vector};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct StructuredEmbedder {
    config: Arc<ModelConfig>,
    current: RwLock<Option<Arc<FittedEncoderState>>>,
}

impl StructuredEmbedder {
    /// Embedder with nothing published yet; `embed` fails with NotFitted.
    pub fn new(config: Arc<ModelConfig>) -> Self {
        Self {
            config,
            current: RwLock::new(None),
        }
    }

    pub fn with_state(config: Arc<ModelConfig>, state: FittedEncoderState) -> Result<Self> {
        let embedder = Self::new(config);
        embedder.publish(state)?;
        Ok(embedder)
    }

    pub fn config(&self) -> &Arc<ModelConfig> {
        &self.config
    }

    /// Replace the serving state, returning the previous one.
    ///
    /// The state must be fully built and share the serving feature layout.
    pub fn publish(&self, state: FittedEncoderState) -> Result<Option<Arc<FittedEncoderState>>> {
        self.check_layout(&state)?;

        let info = state.info().clone();
        let previous = self.current.write().replace(Arc::new(state));
        info!(
            model = %self.config.name,
            pipeline_version = info.pipeline_version,
            fitted_at = info.fitted_at,
            corpus_size = info.corpus_size,
            replaced = previous.is_some(),
            "Published fitted encoder state"
        );
        Ok(previous)
    }

    /// Whether `state` could be published here
    pub fn check_layout(&self, state: &FittedEncoderState) -> Result<()> {
        if !state.config().same_feature_layout(&self.config) {
            return Err(Error::Config(format!(
                "fitted state for '{}' does not match the serving feature layout of '{}'",
                state.config().name,
                self.config.name
            )));
        }
        Ok(())
    }

    /// Snapshot of the published state
    pub fn current(&self) -> Result<Arc<FittedEncoderState>> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| Error::not_fitted("structured embedder"))
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    pub fn embed(&self, record: &ApplicationRecord) -> Result<Vector> {
        self.current()?.assemble(record)
    }
}
