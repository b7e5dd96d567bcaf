//! Per-field transforms
//!
//! Each configured field is encoded by one [`FieldTransform`], chosen by the
//! transformer kind of its feature group. Transforms that learn from the
//! corpus (scaler, onehot, tfidf vocabulary) refuse to encode until fitted.

use crate::ngram::hashed_counts;
use fraudx_core::hashing::bucket;
use fraudx_core::{Error, FieldValue, NGramVariant, Result, TransformerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Standard deviations below this are treated as zero.
const MIN_STD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScalerParams {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldTransform {
    /// Stable hash bucket, optionally scaled into `[0, 1)`
    Hash { buckets: u64, normalize: bool },
    /// Standardization with corpus mean and std
    Scaler(Option<ScalerParams>),
    /// Sorted vocabulary of canonical values
    OneHot(Option<Vec<String>>),
    /// Hashed character n-grams; `idf` is only learned by the vocabulary variant
    NGram {
        n: usize,
        buckets: usize,
        variant: NGramVariant,
        idf: Option<Vec<f64>>,
    },
}

impl FieldTransform {
    /// Unfitted transform for a transformer kind
    pub fn for_kind(kind: &TransformerKind) -> Self {
        match *kind {
            TransformerKind::Hash { buckets, normalize } => {
                FieldTransform::Hash { buckets, normalize }
            }
            TransformerKind::Scaler => FieldTransform::Scaler(None),
            TransformerKind::OneHot => FieldTransform::OneHot(None),
            TransformerKind::Tfidf { ngram, buckets, variant } => FieldTransform::NGram {
                n: ngram,
                buckets,
                variant,
                idf: None,
            },
        }
    }

    /// True when `self` was derived from `kind`, fitted or not.
    pub fn matches_kind(&self, kind: &TransformerKind) -> bool {
        match (self, kind) {
            (
                FieldTransform::Hash { buckets, normalize },
                TransformerKind::Hash {
                    buckets: b,
                    normalize: nz,
                },
            ) => buckets == b && normalize == nz,
            (FieldTransform::Scaler(_), TransformerKind::Scaler) => true,
            (FieldTransform::OneHot(_), TransformerKind::OneHot) => true,
            (
                FieldTransform::NGram { n, buckets, variant, .. },
                TransformerKind::Tfidf { ngram, buckets: b, variant: v },
            ) => n == ngram && buckets == b && variant == v,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldTransform::Hash { .. } => "hash",
            FieldTransform::Scaler(_) => "scaler",
            FieldTransform::OneHot(_) => "onehot",
            FieldTransform::NGram { .. } => "tfidf",
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            FieldTransform::Hash { .. } => true,
            FieldTransform::Scaler(params) => params.is_some(),
            FieldTransform::OneHot(vocab) => vocab.is_some(),
            FieldTransform::NGram { variant, idf, .. } => {
                *variant == NGramVariant::Hashing || idf.is_some()
            }
        }
    }

    /// Output width, or `None` while it depends on fit state
    pub fn width(&self) -> Option<usize> {
        match self {
            FieldTransform::Hash { .. } | FieldTransform::Scaler(_) => Some(1),
            FieldTransform::OneHot(vocab) => vocab.as_ref().map(Vec::len),
            FieldTransform::NGram { buckets, .. } => Some(*buckets),
        }
    }

    /// Learn parameters from one column of the corpus.
    pub fn fit(&mut self, column: &[Option<&FieldValue>]) {
        match self {
            FieldTransform::Hash { .. } => {}
            FieldTransform::Scaler(params) => {
                let values: Vec<f64> = column.iter().flatten().filter_map(|v| v.as_f64()).collect();
                *params = Some(scaler_params(&values));
            }
            FieldTransform::OneHot(vocab) => {
                let distinct: BTreeSet<String> = column
                    .iter()
                    .flatten()
                    .map(|v| v.canonical_text())
                    .filter(|s| !s.is_empty())
                    .collect();
                *vocab = Some(distinct.into_iter().collect());
            }
            FieldTransform::NGram { n, buckets, variant, idf } => {
                if *variant == NGramVariant::Vocabulary {
                    *idf = Some(smoothed_idf(column, *n, *buckets));
                }
            }
        }
    }

    /// Append the encoding of `value` to `out`.
    pub fn encode(
        &self,
        field: &str,
        value: Option<&FieldValue>,
        out: &mut Vec<f64>,
    ) -> Result<()> {
        if !self.is_fitted() {
            return Err(Error::not_fitted(format!(
                "{} transform for field '{}'",
                self.name(),
                field
            )));
        }

        match self {
            FieldTransform::Hash { buckets, normalize } => {
                let encoded = match value {
                    Some(v) => {
                        let b = bucket(&v.canonical_text(), *buckets) as f64;
                        if *normalize { b / *buckets as f64 } else { b }
                    }
                    None => 0.0,
                };
                out.push(encoded);
            }
            FieldTransform::Scaler(params) => {
                let ScalerParams { mean, std } = params.ok_or_else(|| Error::not_fitted("scaler"))?;
                let encoded = match value {
                    Some(v) => {
                        let x = v
                            .as_f64()
                            .ok_or_else(|| Error::encoding(field, "value has no numeric reading"))?;
                        (x - mean) / std
                    }
                    None => 0.0,
                };
                out.push(encoded);
            }
            FieldTransform::OneHot(vocab) => {
                let vocab = vocab.as_ref().ok_or_else(|| Error::not_fitted("onehot"))?;
                let start = out.len();
                out.resize(start + vocab.len(), 0.0);
                if let Some(v) = value {
                    if let Ok(pos) = vocab.binary_search(&v.canonical_text()) {
                        out[start + pos] = 1.0;
                    }
                }
            }
            FieldTransform::NGram { n, buckets, idf, .. } => {
                let mut counts = match value {
                    Some(v) => hashed_counts(&v.canonical_text(), *n, *buckets),
                    None => vec![0.0; *buckets],
                };
                if let Some(weights) = idf {
                    for (c, w) in counts.iter_mut().zip(weights) {
                        *c *= w;
                    }
                }
                l2_normalize(&mut counts);
                out.extend_from_slice(&counts);
            }
        }
        Ok(())
    }
}

fn scaler_params(values: &[f64]) -> ScalerParams {
    if values.is_empty() {
        return ScalerParams { mean: 0.0, std: 1.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    ScalerParams {
        mean,
        std: if std < MIN_STD { 1.0 } else { std },
    }
}

/// `ln((1 + N) / (1 + df)) + 1` per bucket, N counting every corpus row.
fn smoothed_idf(column: &[Option<&FieldValue>], n: usize, buckets: usize) -> Vec<f64> {
    let docs = column.len() as f64;
    let mut df = vec![0usize; buckets];
    for value in column.iter().flatten() {
        let counts = hashed_counts(&value.canonical_text(), n, buckets);
        for (d, c) in df.iter_mut().zip(&counts) {
            if *c > 0.0 {
                *d += 1;
            }
        }
    }
    df.into_iter()
        .map(|d| ((1.0 + docs) / (1.0 + d as f64)).ln() + 1.0)
        .collect()
}

fn l2_normalize(values: &mut [f64]) {
    let norm = values.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in values.iter_mut() {
            *x /= norm;
        }
    }
}
