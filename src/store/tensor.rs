// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Dense tensor values stored in the keyspace and passed through run contexts.
//!
//! Tensors are immutable once constructed: the element buffer lives behind an
//! `Arc`, so a "shallow copy" (the only copy the run pipeline ever makes) is a
//! reference-count bump. This is what makes it safe to hand the same tensor to
//! a queued job, a DAG-local table, and the keyspace at the same time.

use std::fmt;
use std::sync::Arc;

/// Element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float,
    Double,
    Int32,
    Int64,
    Uint8,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::Float => 4,
            DType::Double => 8,
            DType::Int32 => 4,
            DType::Int64 => 8,
            DType::Uint8 => 1,
        }
    }

    /// Parse a dtype token as it appears in command streams (case-insensitive).
    pub fn parse(token: &str) -> Option<DType> {
        match token.to_ascii_uppercase().as_str() {
            "FLOAT" => Some(DType::Float),
            "DOUBLE" => Some(DType::Double),
            "INT32" => Some(DType::Int32),
            "INT64" => Some(DType::Int64),
            "UINT8" => Some(DType::Uint8),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Float => "FLOAT",
            DType::Double => "DOUBLE",
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::Uint8 => "UINT8",
        };
        write!(f, "{}", name)
    }
}

/// A dense, shape-tagged byte buffer.
///
/// Cloning a `Tensor` shares the underlying buffer; there is no deep-copy
/// path anywhere in the crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Arc<Vec<u8>>,
}

impl Tensor {
    /// Element count implied by `shape`. `None` when the product overflows,
    /// which only client-supplied shapes can make happen.
    fn element_count(shape: &[usize]) -> Option<usize> {
        shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Create a tensor from a raw little-endian byte buffer.
    ///
    /// Returns `None` when the buffer length does not match
    /// `num_elements * dtype.size()`, or when the shape overflows.
    pub fn from_bytes(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Option<Tensor> {
        let expected = Self::element_count(&shape)?.checked_mul(dtype.size())?;
        if data.len() != expected {
            return None;
        }
        Some(Tensor {
            dtype,
            shape,
            data: Arc::new(data),
        })
    }

    /// Create a zero-filled tensor. `None` when the shape overflows.
    pub fn zeroed(dtype: DType, shape: Vec<usize>) -> Option<Tensor> {
        let len = Self::element_count(&shape)?.checked_mul(dtype.size())?;
        Some(Tensor {
            dtype,
            shape,
            data: Arc::new(vec![0u8; len]),
        })
    }

    /// Create a FLOAT tensor from `f32` values.
    ///
    /// Returns `None` when the value count does not match the shape.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Option<Tensor> {
        if Self::element_count(&shape) != Some(values.len()) {
            return None;
        }
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Some(Tensor {
            dtype: DType::Float,
            shape,
            data: Arc::new(data),
        })
    }

    /// Create a tensor by parsing textual values, as they appear after the
    /// `VALUES` token of a TENSORSET command.
    pub fn from_values(dtype: DType, shape: Vec<usize>, values: &[&str]) -> Option<Tensor> {
        if Self::element_count(&shape) != Some(values.len()) {
            return None;
        }
        let mut data = Vec::with_capacity(values.len() * dtype.size());
        for v in values {
            match dtype {
                DType::Float => data.extend_from_slice(&v.parse::<f32>().ok()?.to_le_bytes()),
                DType::Double => data.extend_from_slice(&v.parse::<f64>().ok()?.to_le_bytes()),
                DType::Int32 => data.extend_from_slice(&v.parse::<i32>().ok()?.to_le_bytes()),
                DType::Int64 => data.extend_from_slice(&v.parse::<i64>().ok()?.to_le_bytes()),
                DType::Uint8 => data.push(v.parse::<u8>().ok()?),
            }
        }
        Some(Tensor {
            dtype,
            shape,
            data: Arc::new(data),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Leading (batch) dimension. Rank-0 tensors count as a single sample.
    pub fn leading_dim(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Reference-counted copy sharing the element buffer.
    pub fn shallow_copy(&self) -> Tensor {
        self.clone()
    }

    /// Decode the buffer as `f32` values. `None` unless dtype is FLOAT.
    pub fn as_f32_vec(&self) -> Option<Vec<f32>> {
        if self.dtype != DType::Float {
            return None;
        }
        let mut out = Vec::with_capacity(self.num_elements());
        for chunk in self.data.chunks_exact(4) {
            out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_f32_round_trips() {
        let t = Tensor::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.dtype(), DType::Float);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.leading_dim(), 2);
        assert_eq!(t.as_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn from_f32_rejects_shape_mismatch() {
        assert!(Tensor::from_f32(vec![3], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn from_values_parses_each_dtype() {
        let f = Tensor::from_values(DType::Float, vec![2], &["1.5", "-2"]).unwrap();
        assert_eq!(f.as_f32_vec().unwrap(), vec![1.5, -2.0]);

        let i = Tensor::from_values(DType::Int64, vec![1], &["42"]).unwrap();
        assert_eq!(i.byte_size(), 8);

        assert!(Tensor::from_values(DType::Int32, vec![1], &["notanumber"]).is_none());
    }

    #[test]
    fn shallow_copy_shares_buffer() {
        let a = Tensor::from_f32(vec![1], &[7.0]).unwrap();
        let b = a.shallow_copy();
        assert!(Arc::ptr_eq(&a.data, &b.data));
    }

    #[test]
    fn scalar_leading_dim_is_one() {
        let t = Tensor::zeroed(DType::Float, vec![]).unwrap();
        assert_eq!(t.leading_dim(), 1);
        assert_eq!(t.num_elements(), 1);
    }

    #[test]
    fn overflowing_shape_is_rejected_not_wrapped() {
        // usize::MAX / 2 + 1 times 2 wraps to zero with unchecked math,
        // which would admit a tensor whose shape disagrees with its data.
        let dim = usize::MAX / 2 + 1;
        assert!(Tensor::from_values(DType::Float, vec![dim, 2], &[]).is_none());
        assert!(Tensor::from_bytes(DType::Float, vec![dim, 2], Vec::new()).is_none());
        assert!(Tensor::zeroed(DType::Uint8, vec![dim, 2]).is_none());
        assert!(Tensor::from_f32(vec![dim, 2], &[]).is_none());
    }
}
