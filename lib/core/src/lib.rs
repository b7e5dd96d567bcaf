//! # fraudx Core
//!
//! Shared building blocks for the fraudx screening pipeline:
//!
//! - [`ModelConfig`] - fields, feature groups, embedding width and thresholds
//! - [`FieldTable`] - the validated, typed view of the configured fields
//! - [`ApplicationRecord`] - an inbound application
//! - [`Vector`] - a float32 embedding compared by cosine similarity
//! - [`StoredCase`] / [`EmbeddingStore`] - the append-only case store contract
//!
//! ## Example
//!
//! ```rust
//! use fraudx_core::{ModelConfig, FieldTable, ApplicationRecord};
//!
//! let config = ModelConfig::from_json_str(r#"{
//!     "name": "merchants",
//!     "fields": [{"name": "email", "type": "string"}],
//!     "feature_groups": [{"name": "contact", "fields": ["email"]}],
//!     "embedding_dim": 8
//! }"#).unwrap();
//!
//! let table = FieldTable::build(&config).unwrap();
//! let record = ApplicationRecord::new().with("email", "owner@example.com");
//! assert!(table.coerce(&record).is_ok());
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod field_table;
pub mod hashing;
pub mod record;
pub mod store;
pub mod vector;

pub use case::{rank_hits, StoreHit, StoredCase};
pub use config::{
    FeatureGroup, FieldSpec, FieldType, ModelConfig, NGramVariant, ReducerConfig, SearchConfig,
    Thresholds, TransformerKind,
};
pub use error::{Error, Result};
pub use field_table::{FieldTable, TypedRecord};
pub use record::{ApplicationRecord, FieldValue};
pub use store::EmbeddingStore;
pub use vector::Vector;
