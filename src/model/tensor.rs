//! Dense f32 tensors as stored in weight files.

use crate::errors::{MiniLmError, Result};

/// Largest rank a weight file may declare.
pub const MAX_RANK: usize = 4;

/// A named weight's shape, layout and payload.
///
/// `data` is always stored row-major; `strides` records that layout in elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<u32>,
    strides: Vec<i64>,
    data: Vec<f32>,
}

impl Tensor {
    /// Build a row-major tensor. Fails if the rank or element count is inconsistent.
    pub fn new(dims: Vec<u32>, data: Vec<f32>) -> Result<Self> {
        check_dims(&dims)?;
        let numel = checked_numel(&dims)?;
        if data.len() != numel {
            return Err(MiniLmError::Format(format!(
                "tensor with dims {:?} needs {} elements, got {}",
                dims,
                numel,
                data.len()
            )));
        }
        let strides = row_major_strides(&dims);
        Ok(Self {
            dims,
            strides,
            data,
        })
    }

    /// Build a tensor from data laid out with arbitrary dense `strides`, reordering it row-major.
    pub fn from_strided(dims: Vec<u32>, strides: &[i64], data: Vec<f32>) -> Result<Self> {
        check_dims(&dims)?;
        if strides.len() != dims.len() {
            return Err(MiniLmError::Format(format!(
                "{} strides for {} dims",
                strides.len(),
                dims.len()
            )));
        }
        let numel = checked_numel(&dims)?;
        if data.len() != numel {
            return Err(MiniLmError::Format(format!(
                "strided payload holds {} elements, dims need {}",
                data.len(),
                numel
            )));
        }
        if strides == row_major_strides(&dims).as_slice() {
            return Self::new(dims, data);
        }
        check_dense_layout(&dims, strides)?;

        let mut out = vec![0.0f32; numel];
        let mut index = vec![0usize; dims.len()];
        for slot in out.iter_mut() {
            let src: i64 = index
                .iter()
                .zip(strides)
                .map(|(&i, &s)| i as i64 * s)
                .sum();
            *slot = data[src as usize];
            for axis in (0..dims.len()).rev() {
                index[axis] += 1;
                if index[axis] < dims[axis] as usize {
                    break;
                }
                index[axis] = 0;
            }
        }
        Self::new(dims, out)
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Dims as `usize`, convenient for shape comparisons.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|&d| d as usize).collect()
    }

    /// Shape with leading unit axes removed, so `[1, 384]` and `[384]` compare equal.
    pub fn squeezed_shape(&self) -> Vec<usize> {
        let shape = self.shape();
        let first = shape
            .iter()
            .position(|&d| d != 1)
            .unwrap_or(shape.len().saturating_sub(1));
        shape[first..].to_vec()
    }

}

/// Product of `dims`, or `Format` when it does not fit in `usize`.
pub(crate) fn checked_numel(dims: &[u32]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
        .ok_or_else(|| {
            MiniLmError::Format(format!("dims {:?} overflow the element count", dims))
        })
}

/// Byte length of `elements` float32 values, or `Format` on overflow.
pub(crate) fn payload_bytes(elements: usize) -> Result<u64> {
    (elements as u64).checked_mul(4).ok_or_else(|| {
        MiniLmError::Format(format!("{} elements overflow the payload size", elements))
    })
}

pub(crate) fn row_major_strides(dims: &[u32]) -> Vec<i64> {
    let mut strides = vec![0i64; dims.len()];
    let mut acc = 1i64;
    for axis in (0..dims.len()).rev() {
        strides[axis] = acc;
        acc *= dims[axis] as i64;
    }
    strides
}

fn check_dims(dims: &[u32]) -> Result<()> {
    if dims.is_empty() || dims.len() > MAX_RANK {
        return Err(MiniLmError::Format(format!(
            "rank {} outside [1, {}]",
            dims.len(),
            MAX_RANK
        )));
    }
    if let Some(d) = dims.iter().find(|&&d| d == 0) {
        return Err(MiniLmError::Format(format!(
            "dimension {} in {:?} must be positive",
            d, dims
        )));
    }
    Ok(())
}

/// Strides must cover every element exactly once: sorted by stride, each equals the
/// product of the extents of all faster-moving axes.
fn check_dense_layout(dims: &[u32], strides: &[i64]) -> Result<()> {
    let mut axes: Vec<usize> = (0..dims.len()).collect();
    axes.sort_by_key(|&a| strides[a]);
    let mut expected = 1i64;
    for &axis in &axes {
        if strides[axis] != expected {
            return Err(MiniLmError::Format(format!(
                "strides {:?} do not describe a dense layout for dims {:?}",
                strides, dims
            )));
        }
        expected *= dims[axis] as i64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_strides_for_matrix() {
        assert_eq!(row_major_strides(&[3, 4]), vec![4, 1]);
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
    }

    #[test]
    fn rejects_bad_rank_and_zero_dims() {
        assert!(Tensor::new(vec![], vec![]).is_err());
        assert!(Tensor::new(vec![1, 1, 1, 1, 1], vec![0.0]).is_err());
        assert!(Tensor::new(vec![2, 0], vec![]).is_err());
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Tensor::new(vec![2, 2], vec![1.0; 3]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn column_major_is_reordered() {
        // [[1, 2, 3], [4, 5, 6]] stored column-major.
        let data = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        let t = Tensor::from_strided(vec![2, 3], &[1, 2], data).unwrap();
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.strides(), &[3, 1]);
    }

    #[test]
    fn overlapping_strides_rejected() {
        let err = Tensor::from_strided(vec![2, 3], &[1, 1], vec![0.0; 6]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn squeezed_shape_drops_leading_ones() {
        let t = Tensor::new(vec![1, 4], vec![0.0; 4]).unwrap();
        assert_eq!(t.squeezed_shape(), vec![4]);
        let t = Tensor::new(vec![1, 1], vec![0.0]).unwrap();
        assert_eq!(t.squeezed_shape(), vec![1]);
    }

    #[test]
    fn overflowing_dims_are_format_errors() {
        let huge = vec![u32::MAX; 4];
        assert!(checked_numel(&huge).unwrap_err().is_format_error());
        assert!(Tensor::new(huge.clone(), vec![]).unwrap_err().is_format_error());
        assert!(Tensor::from_strided(huge, &[1, 1, 1, 1], vec![])
            .unwrap_err()
            .is_format_error());
        assert_eq!(checked_numel(&[2, 3, 4]).unwrap(), 24);
    }
}
