//! # fraudx Schema
//!
//! Structured embedding pipeline for merchant applications.
//!
//! ## Overview
//!
//! An application is a flat record of scalar fields. The pipeline turns it
//! into one fixed-length float32 vector whose cosine similarity to stored
//! cases drives screening:
//!
//! 1. Every field is coerced to its declared type ([`fraudx_core::FieldTable`])
//! 2. Each feature group encodes its fields with one transform kind
//!    (hash, onehot, tfidf n-grams, scaler) and scales by its weight
//! 3. Group vectors are concatenated in configuration order
//! 4. A fitted PCA projection reduces the raw vector, or it is padded/truncated
//! 5. The result is cast to f32 and checked against `embedding_dim`
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Application │────>│ FieldTable  │────>│  Feature    │────>│ PcaReducer  │
//! │  (record)   │     │  (coerce)   │     │  Encoder    │     │ or pad/trunc│
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                   │
//!                                                            ┌──────┴──────┐
//!                                                            │  Embedding  │
//!                                                            └─────────────┘
//! ```
//!
//! Fitting happens offline in [`FittedEncoderState::fit`]. The serving side
//! only ever sees complete states, published through
//! [`StructuredEmbedder::publish`].

pub mod embedder;
pub mod encoder;
pub mod ngram;
pub mod reducer;
pub mod state;
pub mod transform;

pub use embedder::StructuredEmbedder;
pub use encoder::{FeatureEncoder, GroupEncoder};
pub use reducer::{PcaReducer, Projection};
pub use state::{FittedEncoderState, FittedParameters, PipelineInfo, PIPELINE_VERSION};
pub use transform::{FieldTransform, ScalerParams};
