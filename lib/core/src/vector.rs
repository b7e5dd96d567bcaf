use serde::{Deserialize, Serialize};

/// A float32 embedding.
///
/// Magnitude is left as produced by the pipeline; comparisons go through
/// [`Vector::cosine_similarity`], never a raw dot product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self { data: vec![0.0; dim] }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Euclidean norm
    #[inline]
    pub fn norm(&self) -> f32 {
        dot(&self.data, &self.data).sqrt()
    }

    /// Cosine similarity, i.e. `1 - cosine distance`.
    ///
    /// Mismatched dimensions and zero vectors score 0.0.
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (dot(&self.data, &other.data) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

/// Dot product with two accumulators for better pipelining.
/// Accumulates in f64 so that scores are stable regardless of vector length.
#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum1 = 0.0f64;
    let mut sum2 = 0.0f64;

    let chunks_a = a.chunks_exact(2);
    let chunks_b = b.chunks_exact(2);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();

    for (x, y) in chunks_a.zip(chunks_b) {
        sum1 += f64::from(x[0]) * f64::from(y[0]);
        sum2 += f64::from(x[1]) * f64::from(y[1]);
    }
    for (x, y) in rem_a.iter().zip(rem_b) {
        sum1 += f64::from(*x) * f64::from(*y);
    }

    (sum1 + sum2) as f32
}
