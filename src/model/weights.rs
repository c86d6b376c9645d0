//! Named weight tensors and the on-disk layouts they are loaded from.

use crate::errors::{MiniLmError, Result};
use crate::model::config::NUM_LAYERS;
use crate::model::tbf;
use crate::model::tensor::Tensor;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// File extension of per-tensor files in a weight directory.
pub const TENSOR_FILE_EXT: &str = "bin";

pub const WORD_EMBEDDINGS: &str = "embeddings.word_embeddings.weight";
pub const POSITION_EMBEDDINGS: &str = "embeddings.position_embeddings.weight";
pub const TOKEN_TYPE_EMBEDDINGS: &str = "embeddings.token_type_embeddings.weight";
pub const EMBEDDING_NORM_WEIGHT: &str = "embeddings.LayerNorm.weight";
pub const EMBEDDING_NORM_BIAS: &str = "embeddings.LayerNorm.bias";

/// Per-layer weight suffixes, in the order they are consumed by the encoder.
pub const LAYER_SUFFIXES: [&str; 16] = [
    "attention.self.query.weight",
    "attention.self.query.bias",
    "attention.self.key.weight",
    "attention.self.key.bias",
    "attention.self.value.weight",
    "attention.self.value.bias",
    "attention.output.dense.weight",
    "attention.output.dense.bias",
    "attention.output.LayerNorm.weight",
    "attention.output.LayerNorm.bias",
    "intermediate.dense.weight",
    "intermediate.dense.bias",
    "output.dense.weight",
    "output.dense.bias",
    "output.LayerNorm.weight",
    "output.LayerNorm.bias",
];

pub fn layer_weight_name(layer: usize, suffix: &str) -> String {
    format!("encoder.layer.{}.{}", layer, suffix)
}

/// Every weight name the encoder needs.
pub fn required_weight_names() -> Vec<String> {
    let mut names: Vec<String> = [
        WORD_EMBEDDINGS,
        POSITION_EMBEDDINGS,
        TOKEN_TYPE_EMBEDDINGS,
        EMBEDDING_NORM_WEIGHT,
        EMBEDDING_NORM_BIAS,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for layer in 0..NUM_LAYERS {
        names.extend(LAYER_SUFFIXES.iter().map(|s| layer_weight_name(layer, s)));
    }
    names
}

/// Mapping from weight name to tensor. Immutable once handed to a session.
#[derive(Debug, Clone, Default)]
pub struct WeightSet {
    tensors: HashMap<String, Tensor>,
}

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Remove a tensor, failing with [`MiniLmError::MissingWeight`] when absent.
    pub fn take(&mut self, name: &str) -> Result<Tensor> {
        self.tensors
            .remove(name)
            .ok_or_else(|| MiniLmError::MissingWeight(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fail on the first required weight that is absent.
    pub fn check_required(&self) -> Result<()> {
        match required_weight_names()
            .into_iter()
            .find(|name| !self.tensors.contains_key(name))
        {
            Some(missing) => Err(MiniLmError::MissingWeight(missing)),
            None => Ok(()),
        }
    }

    /// Load from a TBF1 container file or from a directory of `<name>.bin` files.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|e| MiniLmError::resource(path, e))?;
        let set = if meta.is_dir() {
            Self::load_dir(path)?
        } else {
            Self::load_container(path)?
        };
        set.check_required()?;
        Ok(set)
    }

    /// Load every tensor of a TBF1 container.
    pub fn load_container(path: impl AsRef<Path>) -> Result<Self> {
        let mut set = Self::new();
        for (name, tensor) in tbf::load_container(path)? {
            set.insert(name, tensor);
        }
        Ok(set)
    }

    /// Load the required weights from one file per tensor.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut set = Self::new();
        for name in required_weight_names() {
            let file = dir.join(format!("{}.{}", name, TENSOR_FILE_EXT));
            let tensor = match tbf::load_tensor_file(&file) {
                Ok(t) => t,
                Err(MiniLmError::Resource { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    return Err(MiniLmError::MissingWeight(name));
                }
                Err(e) => return Err(e),
            };
            debug!(name = %name, dims = ?tensor.dims(), "loaded tensor file");
            set.insert(name, tensor);
        }
        Ok(set)
    }

    /// Write as a TBF1 container, sorted by name.
    pub fn save_container(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let entries: Vec<(&str, &Tensor)> = self
            .names()
            .into_iter()
            .filter_map(|n| self.tensors.get(n).map(|t| (n, t)))
            .collect();
        let mut buf = Vec::new();
        tbf::write_container(&mut buf, &entries).map_err(|e| MiniLmError::resource(path, e))?;
        std::fs::write(path, buf).map_err(|e| MiniLmError::resource(path, e))
    }

    /// Write one `<name>.bin` file per tensor into `dir`, creating it if needed.
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| MiniLmError::resource(dir, e))?;
        for (name, tensor) in &self.tensors {
            tbf::save_tensor_file(tensor, dir.join(format!("{}.{}", name, TENSOR_FILE_EXT)))?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for WeightSet {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}
