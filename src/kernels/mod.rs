//! Compute kernels for the encoder forward pass.

pub mod cpu;

pub use cpu::{add_assign, dot, gelu, gelu_inplace, layer_norm, linear, softmax};
