//! # fraudx
//!
//! Merchant onboarding fraud screening.
//!
//! Each application is turned into a fixed-length embedding by a fitted
//! feature pipeline, compared against previously labeled cases, and screened
//! into Approve, Review or Decline. A near neighbour only raises the tier when
//! concrete field values corroborate it.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! fraudx fit --corpus fraud_cases.csv
//! fraudx serve --http-port 8000
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use fraudx::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(corpus: Vec<ApplicationRecord>, store: Arc<dyn EmbeddingStore>) -> Result<()> {
//! let config = ModelConfig::load("config/model_config.json")?;
//! let state = FittedEncoderState::fit(&config, &corpus)?;
//!
//! let embedder = Arc::new(StructuredEmbedder::with_state(Arc::new(config), state)?);
//! let engine = DecisionEngine::new(embedder, store);
//!
//! let record = ApplicationRecord::new().with("email", "owner@example.com");
//! let decision = engine.evaluate(&record).await?;
//! println!("{}", decision.decision);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `fraudx-core` - configuration, records, vectors, errors, the store contract
//! - `fraudx-schema` - field transforms, group encoding, PCA, the fitted state
//! - `fraudx-similarity` - corroboration, decision tiers, the decision engine
//! - `fraudx-storage` - case log, model artifacts, corpus loading
//! - `fraudx-api` - REST surface

// Re-export core types
pub use fraudx_core::{
    ApplicationRecord, EmbeddingStore, Error, FeatureGroup, FieldSpec, FieldType, ModelConfig,
    ReducerConfig, Result, SearchConfig, StoreHit, StoredCase, Thresholds, TransformerKind, Vector,
};

// Re-export the pipeline
pub use fraudx_schema::{FittedEncoderState, PipelineInfo, StructuredEmbedder};

// Re-export decisions
pub use fraudx_similarity::{Decision, DecisionEngine, FieldMatch, MatchCandidate, Tier};

// Re-export storage
pub use fraudx_storage::{
    load_corpus, LabeledApplication, MemoryStore, ModelArtifact, StorageManager,
};

// Re-export API
pub use fraudx_api::{AppState, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ApplicationRecord, Decision, DecisionEngine, EmbeddingStore, Error, FittedEncoderState,
        MemoryStore, ModelConfig, Result, StorageManager, StoredCase, StructuredEmbedder, Tier,
        Vector,
    };
}
