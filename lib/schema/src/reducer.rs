//! Dimensionality reduction
//!
//! Principal-component projection fitted offline over the raw training
//! vectors. The eigen-decomposition is a cyclic Jacobi sweep, which is
//! deterministic: fitting twice on the same corpus in the same order yields
//! bit-identical bases.

use fraudx_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const MAX_SWEEPS: usize = 100;

/// Relative off-diagonal mass below which the Jacobi sweep stops
const CONVERGENCE: f64 = 1e-30;

/// Fitted principal-component basis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    mean: Vec<f64>,
    /// Row-major, one unit-length direction per row, by descending variance
    components: Vec<Vec<f64>>,
    explained_variance: Vec<f64>,
}

impl Projection {
    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn output_dim(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// `components · (raw - mean)`
    pub fn project(&self, raw: &[f64]) -> Result<Vec<f64>> {
        if raw.len() != self.input_dim() {
            return Err(Error::InvalidDimension {
                expected: self.input_dim(),
                actual: raw.len(),
            });
        }
        Ok(self
            .components
            .iter()
            .map(|c| c.iter().zip(raw).zip(&self.mean).map(|((w, x), m)| w * (x - m)).sum())
            .collect())
    }
}

/// PCA reducer capped at `max_components` directions
#[derive(Debug, Clone)]
pub struct PcaReducer {
    max_components: usize,
    projection: Option<Projection>,
}

impl PcaReducer {
    pub fn new(max_components: usize) -> Self {
        Self {
            max_components,
            projection: None,
        }
    }

    pub fn from_projection(max_components: usize, projection: Option<Projection>) -> Self {
        Self {
            max_components,
            projection,
        }
    }

    pub fn max_components(&self) -> usize {
        self.max_components
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.projection.is_some()
    }

    /// Fit on rows of equal width; keeps `min(width, max_components)` directions.
    pub fn fit(&mut self, rows: &[Vec<f64>]) -> Result<&Projection> {
        let projection = fit_pca(rows, self.max_components)?;
        Ok(self.projection.insert(projection))
    }

    pub fn transform(&self, raw: &[f64]) -> Result<Vec<f64>> {
        self.projection
            .as_ref()
            .ok_or_else(|| Error::not_fitted("dimensionality reducer"))?
            .project(raw)
    }
}

fn fit_pca(rows: &[Vec<f64>], max_components: usize) -> Result<Projection> {
    let Some(first) = rows.first() else {
        return Err(Error::Fit("cannot fit a projection on zero rows".into()));
    };
    let dim = first.len();
    if dim == 0 {
        return Err(Error::Fit("cannot fit a projection on empty vectors".into()));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
        return Err(Error::InvalidDimension {
            expected: dim,
            actual: bad.len(),
        });
    }

    let n = rows.len() as f64;
    let mut mean = vec![0.0; dim];
    for row in rows {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let centered: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.iter().zip(&mean).map(|(x, m)| x - m).collect())
        .collect();
    let denom = if rows.len() > 1 { n - 1.0 } else { n };

    // Upper triangle in parallel; each entry is summed in row order.
    let upper: Vec<Vec<f64>> = (0..dim)
        .into_par_iter()
        .map(|p| {
            (p..dim)
                .map(|q| centered.iter().map(|r| r[p] * r[q]).sum::<f64>() / denom)
                .collect()
        })
        .collect();
    let mut covariance = vec![vec![0.0; dim]; dim];
    for (p, row) in upper.iter().enumerate() {
        for (offset, value) in row.iter().enumerate() {
            let q = p + offset;
            covariance[p][q] = *value;
            covariance[q][p] = *value;
        }
    }

    let (eigenvalues, eigenvectors) = jacobi_eigen(covariance);

    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let k = dim.min(max_components);
    let mut components = Vec::with_capacity(k);
    let mut explained_variance = Vec::with_capacity(k);
    for &j in order.iter().take(k) {
        let mut direction: Vec<f64> = eigenvectors.iter().map(|row| row[j]).collect();
        fix_sign(&mut direction);
        components.push(direction);
        explained_variance.push(eigenvalues[j].max(0.0));
    }

    Ok(Projection {
        mean,
        components,
        explained_variance,
    })
}

/// Flip `v` so its largest-magnitude coordinate is positive.
fn fix_sign(v: &mut [f64]) {
    let mut pivot = 0;
    for (i, x) in v.iter().enumerate() {
        if x.abs() > v[pivot].abs() {
            pivot = i;
        }
    }
    if v[pivot] < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    let total: f64 = a.iter().flatten().map(|x| x * x).sum();
    if total == 0.0 {
        return ((0..n).map(|_| 0.0).collect(), v);
    }

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[p][q] * a[p][q];
            }
        }
        if off <= CONVERGENCE * total {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = if theta.abs() > 1e150 {
                    1.0 / (2.0 * theta)
                } else {
                    let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                    sign / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k][p];
                    let akq = a[k][q];
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

/// Zero-pad or truncate to `dim`, keeping the leading values.
pub fn fit_length(mut values: Vec<f64>, dim: usize) -> Vec<f64> {
    values.resize(dim, 0.0);
    values
}
