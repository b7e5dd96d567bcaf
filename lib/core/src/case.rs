use crate::record::ApplicationRecord;
use crate::vector::Vector;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A previously screened application, labeled or not.
///
/// Cases are append-only: the store never rewrites one after `put`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCase {
    pub merchant_id: String,
    pub embedding: Vector,
    pub application: ApplicationRecord,
    #[serde(default)]
    pub fraud_reason: Option<String>,
}

impl StoredCase {
    #[inline]
    #[must_use]
    pub fn new(
        merchant_id: impl Into<String>,
        embedding: Vector,
        application: ApplicationRecord,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            embedding,
            application,
            fraud_reason: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_fraud_reason(mut self, reason: impl Into<String>) -> Self {
        self.fraud_reason = Some(reason.into());
        self
    }
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub merchant_id: String,
    /// Cosine similarity to the query
    pub similarity: f32,
    pub application: ApplicationRecord,
    pub fraud_reason: Option<String>,
}

impl StoreHit {
    pub fn from_case(case: &StoredCase, similarity: f32) -> Self {
        Self {
            merchant_id: case.merchant_id.clone(),
            similarity,
            application: case.application.clone(),
            fraud_reason: case.fraud_reason.clone(),
        }
    }
}

/// Similarity descending, then merchant_id ascending.
pub fn hit_order(a: &StoreHit, b: &StoreHit) -> Ordering {
    OrderedFloat(b.similarity)
        .cmp(&OrderedFloat(a.similarity))
        .then_with(|| a.merchant_id.cmp(&b.merchant_id))
}

/// Sort hits into result order and keep the first `limit`.
pub fn rank_hits(hits: &mut Vec<StoreHit>, limit: usize) {
    hits.sort_by(hit_order);
    hits.truncate(limit);
}
