//! Decision types
//!
//! The serialized shape is the screening result returned to callers:
//!
//! ```json
//! {
//!   "decision": "Review",
//!   "vector_similarity": 0.65,
//!   "field_matches": [
//!     { "merchant_id": "m-17", "vector_similarity": 0.65, "fraud_reason": "stolen identity",
//!       "matching_fields": [ { "field": "email", "new_value": "a@x.com",
//!                              "fraud_value": "A@x.com", "similarity": 1.0 } ] }
//!   ]
//! }
//! ```

use fraudx_core::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Screening outcome, ordered by severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Approve,
    Review,
    Decline,
}

impl Tier {
    /// `> decline` declines, `(review, decline]` reviews, anything else approves.
    pub fn from_similarity(similarity: f32, thresholds: &Thresholds) -> Self {
        if similarity > thresholds.decline {
            Tier::Decline
        } else if similarity > thresholds.review {
            Tier::Review
        } else {
            Tier::Approve
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Approve => "Approve",
            Tier::Review => "Review",
            Tier::Decline => "Decline",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field whose value is identical (ignoring case) in both applications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub new_value: String,
    pub fraud_value: String,
    /// Exact matches only, so always 1.0
    pub similarity: f32,
}

impl FieldMatch {
    pub fn exact(
        field: impl Into<String>,
        new_value: impl Into<String>,
        fraud_value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            new_value: new_value.into(),
            fraud_value: fraud_value.into(),
            similarity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub merchant_id: String,
    pub vector_similarity: f32,
    pub fraud_reason: Option<String>,
    pub matching_fields: Vec<FieldMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub decision: Tier,
    pub vector_similarity: f32,
    pub field_matches: Vec<MatchCandidate>,
}

impl Decision {
    /// Nothing similar enough was corroborated.
    pub fn approve() -> Self {
        Self {
            decision: Tier::Approve,
            vector_similarity: 0.0,
            field_matches: Vec::new(),
        }
    }
}

/// Tier from the best of `candidates`, which must already be in result order.
pub fn decide(candidates: Vec<MatchCandidate>, thresholds: &Thresholds) -> Decision {
    let Some(best) = candidates.first() else {
        return Decision::approve();
    };

    Decision {
        decision: Tier::from_similarity(best.vector_similarity, thresholds),
        vector_similarity: best.vector_similarity,
        field_matches: candidates,
    }
}
