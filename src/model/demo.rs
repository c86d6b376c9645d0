//! Seeded random MiniLM weights and a small vocabulary, for tests, benches and demos.
//!
//! Shapes match the real architecture; only the vocabulary is small.

use super::config::MiniLmConfig;
use super::minilm::MiniLmModel;
use super::tensor::Tensor;
use super::weights::{
    layer_weight_name, WeightSet, EMBEDDING_NORM_BIAS, EMBEDDING_NORM_WEIGHT, LAYER_SUFFIXES,
    POSITION_EMBEDDINGS, TOKEN_TYPE_EMBEDDINGS, WORD_EMBEDDINGS,
};
use crate::errors::Result;
use crate::tokenizer::Vocabulary;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEMO_WORDS: [&str; 22] = [
    "the", "of", "what", "capital", "city", "country", "paris", "london", "berlin",
    "madrid", "rome", "germany", "france", "spain", "italy", "england", "is", "in", "river",
    "un", "##able", "##ing",
];

/// Vocabulary lines for the demo model: specials, punctuation, single letters,
/// `##`-prefixed letters and a handful of words. Any lowercase ASCII word is encodable.
pub fn demo_vocab_lines() -> Vec<String> {
    let mut lines: Vec<String> = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    lines.extend("!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~".chars().map(String::from));
    lines.extend(('0'..='9').map(String::from));
    lines.extend(('a'..='z').map(String::from));
    lines.extend(('0'..='9').map(|c| format!("##{}", c)));
    lines.extend(('a'..='z').map(|c| format!("##{}", c)));
    lines.extend(DEMO_WORDS.iter().map(|s| s.to_string()));
    lines
}

/// [`demo_vocab_lines`] as a [`Vocabulary`].
pub fn demo_vocabulary() -> Result<Vocabulary> {
    Vocabulary::from_tokens(demo_vocab_lines())
}

fn rand_tensor(rng: &mut impl Rng, dims: &[u32], scale: f32) -> Result<Tensor> {
    let n = dims.iter().map(|&d| d as usize).product();
    let data = (0..n).map(|_| rng.gen_range(-scale..scale)).collect();
    Tensor::new(dims.to_vec(), data)
}

fn rand_gamma(rng: &mut impl Rng, n: u32) -> Result<Tensor> {
    let data = (0..n).map(|_| rng.gen_range(0.9f32..=1.1f32)).collect();
    Tensor::new(vec![n], data)
}

/// Random weights for a vocabulary of `vocab_size` rows.
pub fn demo_weights_seeded(seed: u64, vocab_size: usize) -> Result<WeightSet> {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = MiniLmConfig::default();
    let hidden = config.hidden_size as u32;
    let inter = config.intermediate_size as u32;

    let mut set = WeightSet::new();
    set.insert(
        WORD_EMBEDDINGS,
        rand_tensor(&mut rng, &[vocab_size as u32, hidden], 0.1)?,
    );
    set.insert(
        POSITION_EMBEDDINGS,
        rand_tensor(
            &mut rng,
            &[config.max_position_embeddings as u32, hidden],
            0.02,
        )?,
    );
    set.insert(
        TOKEN_TYPE_EMBEDDINGS,
        rand_tensor(&mut rng, &[config.type_vocab_size as u32, hidden], 0.02)?,
    );
    set.insert(EMBEDDING_NORM_WEIGHT, rand_gamma(&mut rng, hidden)?);
    set.insert(EMBEDDING_NORM_BIAS, rand_tensor(&mut rng, &[hidden], 0.05)?);

    for layer in 0..config.num_hidden_layers {
        for suffix in LAYER_SUFFIXES {
            let tensor = match suffix {
                "intermediate.dense.weight" => rand_tensor(&mut rng, &[inter, hidden], 0.05),
                "intermediate.dense.bias" => rand_tensor(&mut rng, &[inter], 0.02),
                "output.dense.weight" => rand_tensor(&mut rng, &[hidden, inter], 0.05),
                s if s.ends_with("LayerNorm.weight") => rand_gamma(&mut rng, hidden),
                s if s.ends_with(".weight") => rand_tensor(&mut rng, &[hidden, hidden], 0.05),
                _ => rand_tensor(&mut rng, &[hidden], 0.02),
            };
            set.insert(layer_weight_name(layer, suffix), tensor?);
        }
    }
    Ok(set)
}

/// Create a demo model with a random seed.
pub fn create_demo_model() -> Result<MiniLmModel> {
    create_demo_model_seeded(rand::random::<u64>())
}

/// Create a deterministic demo model sized to [`demo_vocab_lines`].
pub fn create_demo_model_seeded(seed: u64) -> Result<MiniLmModel> {
    MiniLmModel::from_weights(demo_weights_seeded(seed, demo_vocab_lines().len())?)
}
