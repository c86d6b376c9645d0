//! Criterion benchmarks for the encoder kernels.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use minilm_oxidized::kernels::{gelu_inplace, layer_norm, linear, softmax};
use minilm_oxidized::model::{LayerNorm, Linear};
use rand::Rng;

const HIDDEN: usize = 384;
const INTERMEDIATE: usize = 1536;
const SEQ_LEN: usize = 32;

fn random_vec(n: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn make_linear(out_features: usize, in_features: usize) -> Linear {
    Linear {
        weight: random_vec(out_features * in_features),
        bias: random_vec(out_features),
        in_features,
        out_features,
    }
}

fn bench_linear(c: &mut Criterion) {
    let input = random_vec(SEQ_LEN * HIDDEN);
    let square = make_linear(HIDDEN, HIDDEN);
    let up = make_linear(INTERMEDIATE, HIDDEN);

    c.bench_function("linear_32x384x384", |b| {
        b.iter(|| linear(black_box(&input), SEQ_LEN, black_box(&square)))
    });
    c.bench_function("linear_32x384x1536", |b| {
        b.iter(|| linear(black_box(&input), SEQ_LEN, black_box(&up)))
    });
}

fn bench_elementwise(c: &mut Criterion) {
    let norm = LayerNorm {
        gamma: vec![1.0; HIDDEN],
        beta: vec![0.0; HIDDEN],
    };
    let hidden = random_vec(SEQ_LEN * HIDDEN);
    let inner = random_vec(SEQ_LEN * INTERMEDIATE);
    let scores = random_vec(SEQ_LEN);

    c.bench_function("layer_norm_32x384", |b| {
        b.iter(|| {
            let mut x = hidden.clone();
            layer_norm(black_box(&mut x), &norm, 1e-12);
            x
        })
    });
    c.bench_function("gelu_32x1536", |b| {
        b.iter(|| {
            let mut x = inner.clone();
            gelu_inplace(black_box(&mut x));
            x
        })
    });
    c.bench_function("softmax_32", |b| {
        b.iter(|| {
            let mut s = scores.clone();
            softmax(black_box(&mut s));
            s
        })
    });
}

criterion_group!(benches, bench_linear, bench_elementwise);
criterion_main!(benches);
