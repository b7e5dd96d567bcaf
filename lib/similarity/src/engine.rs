//! Decision engine
//!
//! Embeds an application, queries the case store for near-duplicates above
//! the review threshold, corroborates them and derives the tier. The store
//! query is the only blocking step; it runs on the blocking pool under a
//! deadline, and a missed deadline is an outage, never an empty result.

use crate::corroborate::Corroborator;
use crate::decision::{decide, Decision};
use fraudx_core::{
    rank_hits, ApplicationRecord, EmbeddingStore, Error, Result, SearchConfig, StoreHit,
    Thresholds, Vector,
};
use fraudx_schema::StructuredEmbedder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct DecisionEngine {
    embedder: Arc<StructuredEmbedder>,
    store: Arc<dyn EmbeddingStore>,
    corroborator: Corroborator,
    thresholds: Thresholds,
    search: SearchConfig,
}

impl DecisionEngine {
    /// Engine over the embedder's configuration.
    pub fn new(embedder: Arc<StructuredEmbedder>, store: Arc<dyn EmbeddingStore>) -> Self {
        let config = embedder.config().clone();
        Self {
            corroborator: Corroborator::new(&config),
            thresholds: config.similarity_thresholds,
            search: config.search.clone(),
            embedder,
            store,
        }
    }

    pub fn embedder(&self) -> &Arc<StructuredEmbedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Screen one application.
    ///
    /// Embedding and store failures abort the evaluation.
    pub async fn evaluate(&self, record: &ApplicationRecord) -> Result<Decision> {
        let embedding = self.embedder.embed(record)?;
        self.evaluate_embedding(record, embedding).await
    }

    /// Screen an application whose embedding was already assembled.
    pub async fn evaluate_embedding(
        &self,
        record: &ApplicationRecord,
        embedding: Vector,
    ) -> Result<Decision> {
        if embedding.dim() != self.embedder.embedding_dim() {
            return Err(Error::InvalidDimension {
                expected: self.embedder.embedding_dim(),
                actual: embedding.dim(),
            });
        }

        let hits = self.query(embedding).await?;
        if hits.is_empty() {
            debug!("No candidates above the review threshold");
            return Ok(Decision::approve());
        }

        let found = hits.len();
        let candidates = self
            .corroborator
            .corroborate(record, hits, self.search.require_corroboration);
        let decision = decide(candidates, &self.thresholds);

        info!(
            decision = %decision.decision,
            vector_similarity = decision.vector_similarity,
            candidates = found,
            corroborated = decision.field_matches.len(),
            "Evaluated application"
        );
        Ok(decision)
    }

    async fn query(&self, embedding: Vector) -> Result<Vec<StoreHit>> {
        let store = Arc::clone(&self.store);
        let floor = self.thresholds.review;
        let limit = self.search.limit;
        let timeout = Duration::from_millis(self.search.timeout_ms);

        let task =
            tokio::task::spawn_blocking(move || store.query_nearest(&embedding, floor, limit));
        let mut hits = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(Error::StoreUnavailable(format!("store query failed: {}", e))),
            Err(_) => {
                return Err(Error::StoreUnavailable(format!(
                    "store query timed out after {} ms",
                    self.search.timeout_ms
                )))
            }
        };

        hits.retain(|h| h.similarity >= floor);
        rank_hits(&mut hits, limit);
        Ok(hits)
    }
}
