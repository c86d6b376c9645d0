//! MiniLM model types, weight formats and loading.

pub mod config;
pub mod demo;
pub mod minilm;
pub mod tbf;
pub mod tensor;
pub mod weights;

pub use config::{
    MiniLmConfig, Pooling, SessionConfig, EMBEDDING_DIM, MAX_TOKENS, NUM_LAYERS, POOLING,
};
pub use demo::{
    create_demo_model, create_demo_model_seeded, demo_vocab_lines, demo_vocabulary,
    demo_weights_seeded,
};
pub use minilm::{LayerNorm, Linear, MiniLmLayer, MiniLmModel};
pub use tbf::{
    load_container, load_tensor_file, parse_container, read_tensor, save_tensor_file,
    write_container, write_tensor, CountUnit,
};
pub use tensor::Tensor;
pub use weights::{layer_weight_name, required_weight_names, WeightSet};
