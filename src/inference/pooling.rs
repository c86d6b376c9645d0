//! Reduce hidden states to one unit-length embedding.

use serde::{Deserialize, Serialize};

use crate::errors::{MiniLmError, Result};
use crate::inference::engine::HiddenStates;
use crate::model::{Pooling, EMBEDDING_DIM};

/// Norms below this are treated as degenerate rather than normalized.
pub const MIN_NORM: f32 = 1e-12;

/// A 384-float, L2-normalized sentence embedding. Cosine similarity is the dot product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap raw values (e.g. a stored reference vector). The length must be [`EMBEDDING_DIM`].
    pub fn from_values(values: Vec<f32>) -> Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(MiniLmError::Validation(format!(
                "embedding must have {} values, got {}",
                EMBEDDING_DIM,
                values.len()
            )));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dot(&self, other: &Embedding) -> f32 {
        crate::kernels::dot(&self.0, &other.0)
    }

    /// Equal to [`Embedding::dot`] for normalized vectors; also valid for raw ones.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let denom = self.norm() * other.norm();
        if denom < MIN_NORM {
            return 0.0;
        }
        self.dot(other) / denom
    }

    pub fn l2_distance_squared(&self, other: &Embedding) -> f32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Sum of absolute elementwise differences.
    pub fn abs_diff_sum(&self, other: &Embedding) -> f32 {
        self.0.iter().zip(&other.0).map(|(a, b)| (a - b).abs()).sum()
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Index of the candidate most similar to `query` (largest dot product).
pub fn nearest(query: &Embedding, candidates: &[Embedding]) -> Option<usize> {
    candidates
        .iter()
        .map(|c| query.dot(c))
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Pool `hidden` over the positions where `mask` is set, then L2-normalize.
pub fn pool(hidden: &HiddenStates, mask: &[bool], pooling: Pooling) -> Result<Embedding> {
    let mut pooled = reduce(hidden, mask, pooling)?;
    l2_normalize(&mut pooled)?;
    Embedding::from_values(pooled)
}

/// Un-normalized pooled vector of width `hidden.hidden_size`.
pub fn reduce(hidden: &HiddenStates, mask: &[bool], pooling: Pooling) -> Result<Vec<f32>> {
    let width = hidden.hidden_size;
    let mut pooled = vec![0.0f32; width];
    match pooling {
        Pooling::Mean => {
            let mut count = 0usize;
            for t in (0..hidden.seq_len).filter(|&t| mask.get(t).copied().unwrap_or(false)) {
                for (p, &h) in pooled.iter_mut().zip(hidden.row(t)) {
                    *p += h;
                }
                count += 1;
            }
            if count == 0 {
                return Err(MiniLmError::Inference(
                    "mean pooling over zero unmasked tokens".into(),
                ));
            }
            let inv = 1.0 / count as f32;
            pooled.iter_mut().for_each(|p| *p *= inv);
        }
        Pooling::Cls => {
            if hidden.seq_len == 0 {
                return Err(MiniLmError::Inference("no [CLS] position to pool".into()));
            }
            pooled.copy_from_slice(hidden.row(0));
        }
    }
    Ok(pooled)
}

/// Divide by the Euclidean norm in place. Near-zero or non-finite norms are an error.
pub fn l2_normalize(values: &mut [f32]) -> Result<()> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(MiniLmError::Inference(format!(
            "cannot normalize vector with norm {}",
            norm
        )));
    }
    let inv = 1.0 / norm;
    values.iter_mut().for_each(|v| *v *= inv);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(rows: &[[f32; 2]]) -> HiddenStates {
        HiddenStates {
            data: rows.iter().flatten().copied().collect(),
            seq_len: rows.len(),
            hidden_size: 2,
        }
    }

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_inference_error() {
        let mut v = vec![0.0; 4];
        assert!(matches!(
            l2_normalize(&mut v),
            Err(MiniLmError::Inference(_))
        ));
        let mut v = vec![f32::NAN, 1.0];
        assert!(l2_normalize(&mut v).is_err());
    }

    #[test]
    fn mean_pool_skips_masked_rows() {
        let h = states(&[[1.0, 2.0], [3.0, 0.0], [100.0, 100.0]]);
        let mean = reduce(&h, &[true, true, false], Pooling::Mean).unwrap();
        assert_eq!(mean, vec![2.0, 1.0]);
        let cls = reduce(&h, &[true, true, false], Pooling::Cls).unwrap();
        assert_eq!(cls, vec![1.0, 2.0]);
        let err = reduce(&h, &[false, false, false], Pooling::Mean).unwrap_err();
        assert!(matches!(err, MiniLmError::Inference(_)));
    }

    #[test]
    fn pool_rejects_wrong_width() {
        let h = states(&[[1.0, 2.0]]);
        assert!(pool(&h, &[true], Pooling::Mean).is_err());
    }

    #[test]
    fn nearest_picks_max_dot() {
        let mut a = vec![0.0f32; EMBEDDING_DIM];
        a[0] = 1.0;
        let mut b = vec![0.0f32; EMBEDDING_DIM];
        b[1] = 1.0;
        let mut q = vec![0.0f32; EMBEDDING_DIM];
        q[0] = 0.2;
        q[1] = 0.9;
        let a = Embedding::from_values(a).unwrap();
        let b = Embedding::from_values(b).unwrap();
        let q = Embedding::from_values(q).unwrap();
        assert_eq!(nearest(&q, &[a.clone(), b]), Some(1));
        assert_eq!(nearest(&q, &[]), None);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn from_values_checks_length() {
        assert!(Embedding::from_values(vec![0.0; 3]).is_err());
    }
}
