//! f32 CPU kernels for the encoder.
//!
//! Matrices are row-major `[rows, width]` slices. Work is split across output
//! elements with rayon, but every dot product runs sequentially so results do not
//! depend on how work was scheduled.

#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;

use crate::model::{LayerNorm, Linear};

/// Smallest number of output elements handed to one rayon task.
const MIN_PAR_CHUNK: usize = 64;

/// Sequential dot product.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

/// `input [rows, in_features]` → `[rows, out_features]`, computing `x·Wᵀ + b`.
pub fn linear(input: &[f32], rows: usize, layer: &Linear) -> Vec<f32> {
    let in_features = layer.in_features;
    let out_features = layer.out_features;
    debug_assert_eq!(input.len(), rows * in_features);
    debug_assert_eq!(layer.weight.len(), out_features * in_features);

    let mut output = vec![0.0f32; rows * out_features];
    output
        .par_iter_mut()
        .with_min_len(MIN_PAR_CHUNK)
        .enumerate()
        .for_each(|(idx, out_val)| {
            let row = idx / out_features;
            let col = idx % out_features;
            let x = &input[row * in_features..(row + 1) * in_features];
            let w = &layer.weight[col * in_features..(col + 1) * in_features];
            *out_val = dot(x, w) + layer.bias[col];
        });
    output
}

/// In-place LayerNorm over each row of width `gamma.len()`:
/// `(x - mean) / sqrt(var + eps) * gamma + beta`, population variance.
pub fn layer_norm(hidden: &mut [f32], norm: &LayerNorm, eps: f32) {
    let width = norm.gamma.len();
    debug_assert_eq!(hidden.len() % width, 0);

    hidden.par_chunks_mut(width).for_each(|row| {
        let n = width as f32;
        let mean = row.iter().sum::<f32>() / n;
        let var = row.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n;
        let inv_std = 1.0 / (var + eps).sqrt();
        for i in 0..width {
            row[i] = (row[i] - mean) * inv_std * norm.gamma[i] + norm.beta[i];
        }
    });
}

/// `dst += src` elementwise.
pub fn add_assign(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

/// Row-max-subtracted softmax. `-inf` entries get zero weight.
pub fn softmax(scores: &mut [f32]) {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0f32;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    let inv = 1.0 / sum;
    for s in scores.iter_mut() {
        *s *= inv;
    }
}

/// Tanh approximation of GELU.
#[inline]
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + (0.797_884_6 * (x + 0.044_715 * x * x * x)).tanh())
}

/// Apply [`gelu`] to every element.
pub fn gelu_inplace(values: &mut [f32]) {
    values
        .par_iter_mut()
        .with_min_len(MIN_PAR_CHUNK)
        .for_each(|v| *v = gelu(*v));
}
