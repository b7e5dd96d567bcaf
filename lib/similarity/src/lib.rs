//! # fraudx Similarity
//!
//! Turns an application and its embedding into a screening decision.
//!
//! ## Features
//!
//! - **Nearest-neighbour query**: cases at or above the review threshold,
//!   best first, ties broken by merchant_id
//! - **Corroboration**: a candidate counts only when concrete field values agree
//! - **Decision tiers**: a pure, monotonic function of the best corroborated
//!   similarity
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Embedder   │────>│ Case store  │────>│ Corroborator│
//! │ (record→v)  │     │ (nearest)   │     │ (exact)     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                         ┌──────┴──────┐
//!                                         │  Decision   │
//!                                         └─────────────┘
//! ```

pub mod corroborate;
pub mod decision;
pub mod engine;

pub use corroborate::Corroborator;
pub use decision::{decide, Decision, FieldMatch, MatchCandidate, Tier};
pub use engine::DecisionEngine;
