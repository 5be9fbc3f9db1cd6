//! Dense n-dimensional tensor type.
//!
//! A tensor is a flat element buffer plus a shape, column-major so 2-D
//! tensors alias directly into faer matrices for the GEMM kernel. Offsets
//! are folded from the shape at access time; there is no cached stride
//! vector and no storage abstraction underneath. Values of this type sit
//! in graph node slots, where the deletion pass drops them wholesale and
//! the recomputation engine rebuilds them, so the type stays a plain
//! owned buffer with no interior sharing.

use crate::error::TensorError;
use crate::scalar::{DType, Scalar};

/// Number of elements a shape addresses. A rank-0 tensor holds one.
fn element_count(shape: &[usize]) -> usize {
    if shape.is_empty() {
        1
    } else {
        shape.iter().product()
    }
}

/// A dense n-dimensional tensor with column-major element order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Scalar> {
    data: Vec<T>,
    shape: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    /// Create a new tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use adtensors::Tensor;
    ///
    /// let t: Tensor<f64> = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: vec![T::zero(); element_count(shape)],
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor from column-major element data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use adtensors::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.get(&[1, 0]), Some(&2.0)); // column-major: [1,0] is the second element
    /// ```
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TensorError> {
        let expected = element_count(shape);
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        Self {
            data: vec![value; element_count(shape)],
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, T::one())
    }

    /// Create a `[1]`-shaped tensor holding a single value.
    ///
    /// Reductions produce this form, and the backward pass seeds its root
    /// gradient from it.
    pub fn scalar(value: T) -> Self {
        Self {
            data: vec![value],
            shape: vec![1],
        }
    }

    /// Get the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the rank (number of dimensions).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if tensor is empty (has zero elements).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element type tag.
    #[inline]
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Size of the element data in bytes.
    ///
    /// This is what the checkpoint core counts when it estimates
    /// reclaimable memory.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64 * T::DTYPE.bytes_per_element()
    }

    /// Get underlying data as slice, column-major.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get underlying data as mutable slice.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get element by linear index.
    #[inline]
    pub fn get_linear(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    /// Column-major offset of a cartesian index, folded from the shape.
    ///
    /// `None` on rank mismatch or any out-of-range coordinate.
    fn offset_of(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        let mut stride = 1;
        for (&i, &dim) in indices.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset += i * stride;
            stride *= dim;
        }
        Some(offset)
    }

    /// Get element by cartesian indices.
    ///
    /// Returns `None` if indices are out of bounds or the wrong rank.
    pub fn get(&self, indices: &[usize]) -> Option<&T> {
        self.offset_of(indices).map(|i| &self.data[i])
    }

    /// Set element by cartesian indices.
    ///
    /// # Errors
    ///
    /// Returns error if indices are out of bounds or the wrong rank.
    pub fn set(&mut self, indices: &[usize], value: T) -> Result<(), TensorError> {
        if indices.len() != self.shape.len() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.shape.len(),
                actual: indices.len(),
            });
        }
        let mut offset = 0;
        let mut stride = 1;
        for (&i, &dim) in indices.iter().zip(&self.shape) {
            if i >= dim {
                return Err(TensorError::IndexOutOfBounds {
                    index: i,
                    dim_size: dim,
                });
            }
            offset += i * stride;
            stride *= dim;
        }
        self.data[offset] = value;
        Ok(())
    }

    /// Fill all elements with a value.
    pub fn fill(&mut self, value: T) {
        for x in &mut self.data {
            *x = value;
        }
    }
}
