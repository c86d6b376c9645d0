//! MiniLM encoder weights, organized per layer with shapes checked.

use crate::errors::{MiniLmError, Result};
use crate::model::config::MiniLmConfig;
use crate::model::tensor::Tensor;
use crate::model::weights::{
    layer_weight_name, WeightSet, EMBEDDING_NORM_BIAS, EMBEDDING_NORM_WEIGHT,
    POSITION_EMBEDDINGS, TOKEN_TYPE_EMBEDDINGS, WORD_EMBEDDINGS,
};

/// Dense projection `y = x·Wᵀ + b` with `W` stored `[out_features, in_features]`.
#[derive(Debug, Clone)]
pub struct Linear {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub in_features: usize,
    pub out_features: usize,
}

/// LayerNorm scale and shift.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
}

/// One encoder layer: self-attention block then feedforward block, each post-normed.
#[derive(Debug, Clone)]
pub struct MiniLmLayer {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub attention_output: Linear,
    pub attention_norm: LayerNorm,
    pub intermediate: Linear,
    pub output: Linear,
    pub output_norm: LayerNorm,
}

/// Full encoder.
#[derive(Debug, Clone)]
pub struct MiniLmModel {
    pub config: MiniLmConfig,
    /// Word embeddings [vocab_size, hidden_size]
    pub word_embeddings: Vec<f32>,
    /// Position embeddings [max_position_embeddings, hidden_size]
    pub position_embeddings: Vec<f32>,
    /// Token type embeddings [type_vocab_size, hidden_size]; only row 0 is used.
    pub token_type_embeddings: Vec<f32>,
    pub embedding_norm: LayerNorm,
    pub layers: Vec<MiniLmLayer>,
}

fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = if expected.len() == 1 {
        tensor.squeezed_shape()
    } else {
        tensor.shape()
    };
    if actual != expected {
        return Err(MiniLmError::DimensionMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: tensor.shape(),
        });
    }
    Ok(())
}

/// Take a `[rows, width]` table, returning its row count.
fn take_table(weights: &mut WeightSet, name: &str, width: usize) -> Result<(Vec<f32>, usize)> {
    let tensor = weights.take(name)?;
    let shape = tensor.shape();
    if shape.len() != 2 || shape[1] != width {
        return Err(MiniLmError::DimensionMismatch {
            name: name.to_string(),
            expected: vec![shape.first().copied().unwrap_or(0), width],
            actual: shape,
        });
    }
    Ok((tensor.into_data(), shape[0]))
}

fn take_vector(weights: &mut WeightSet, name: &str, len: usize) -> Result<Vec<f32>> {
    let tensor = weights.take(name)?;
    expect_shape(name, &tensor, &[len])?;
    Ok(tensor.into_data())
}

fn take_linear(
    weights: &mut WeightSet,
    prefix: &str,
    out_features: usize,
    in_features: usize,
) -> Result<Linear> {
    let weight_name = format!("{}.weight", prefix);
    let weight = weights.take(&weight_name)?;
    expect_shape(&weight_name, &weight, &[out_features, in_features])?;
    let bias = take_vector(weights, &format!("{}.bias", prefix), out_features)?;
    Ok(Linear {
        weight: weight.into_data(),
        bias,
        in_features,
        out_features,
    })
}

fn take_norm(weights: &mut WeightSet, prefix: &str, hidden: usize) -> Result<LayerNorm> {
    Ok(LayerNorm {
        gamma: take_vector(weights, &format!("{}.weight", prefix), hidden)?,
        beta: take_vector(weights, &format!("{}.bias", prefix), hidden)?,
    })
}

impl MiniLmModel {
    /// Consume a weight set, checking every tensor against the fixed architecture.
    ///
    /// The vocabulary, position and token type table sizes are taken from the weights.
    pub fn from_weights(mut weights: WeightSet) -> Result<Self> {
        weights.check_required()?;
        let mut config = MiniLmConfig::default();
        let hidden = config.hidden_size;
        let inter = config.intermediate_size;

        let (word_embeddings, vocab_size) = take_table(&mut weights, WORD_EMBEDDINGS, hidden)?;
        let (position_embeddings, max_positions) =
            take_table(&mut weights, POSITION_EMBEDDINGS, hidden)?;
        let (token_type_embeddings, type_vocab_size) =
            take_table(&mut weights, TOKEN_TYPE_EMBEDDINGS, hidden)?;
        let embedding_norm = LayerNorm {
            gamma: take_vector(&mut weights, EMBEDDING_NORM_WEIGHT, hidden)?,
            beta: take_vector(&mut weights, EMBEDDING_NORM_BIAS, hidden)?,
        };
        config.vocab_size = vocab_size;
        config.max_position_embeddings = max_positions;
        config.type_vocab_size = type_vocab_size;

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            let name = |suffix: &str| layer_weight_name(i, suffix);
            layers.push(MiniLmLayer {
                query: take_linear(&mut weights, &name("attention.self.query"), hidden, hidden)?,
                key: take_linear(&mut weights, &name("attention.self.key"), hidden, hidden)?,
                value: take_linear(&mut weights, &name("attention.self.value"), hidden, hidden)?,
                attention_output: take_linear(
                    &mut weights,
                    &name("attention.output.dense"),
                    hidden,
                    hidden,
                )?,
                attention_norm: take_norm(&mut weights, &name("attention.output.LayerNorm"), hidden)?,
                intermediate: take_linear(&mut weights, &name("intermediate.dense"), inter, hidden)?,
                output: take_linear(&mut weights, &name("output.dense"), hidden, inter)?,
                output_norm: take_norm(&mut weights, &name("output.LayerNorm"), hidden)?,
            });
        }

        Ok(Self {
            config,
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            embedding_norm,
            layers,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Longest sequence the position table can encode.
    pub fn max_positions(&self) -> usize {
        self.config.max_position_embeddings
    }
}
