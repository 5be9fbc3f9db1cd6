//! Reduction and row-wise kernels.

use crate::error::TensorError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Sum of all elements, as a `[1]`-shaped tensor.
///
/// # Example
///
/// ```
/// use adtensors::Tensor;
/// use adtensors::kernels::sum_all;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
/// assert_eq!(sum_all(&t).data(), &[6.0]);
/// ```
pub fn sum_all<T: Scalar>(t: &Tensor<T>) -> Tensor<T> {
    let mut acc = T::zero();
    for &x in t.data() {
        acc += x;
    }
    Tensor::scalar(acc)
}

/// Mean of all elements, as a `[1]`-shaped tensor.
pub fn mean_all<T: Scalar>(t: &Tensor<T>) -> Tensor<T> {
    let n = T::from_f64(t.len().max(1) as f64);
    let sum = sum_all(t);
    Tensor::scalar(sum.data()[0] / n)
}

/// Row-wise softmax of a 2-D tensor.
///
/// Each row is shifted by its maximum before exponentiation.
pub fn softmax_rows<T: Scalar>(t: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
    if t.ndim() != 2 {
        return Err(TensorError::RankMismatch {
            op: "softmax",
            expected: 2,
            actual: t.ndim(),
        });
    }

    let (rows, cols) = (t.shape()[0], t.shape()[1]);
    let src = t.data();
    let mut out = Tensor::<T>::zeros(&[rows, cols]);
    let dst = out.data_mut();

    for i in 0..rows {
        let mut max = src[i];
        for j in 1..cols {
            let v = src[i + j * rows];
            if v > max {
                max = v;
            }
        }
        let mut denom = T::zero();
        for j in 0..cols {
            let e = Scalar::exp(src[i + j * rows] - max);
            dst[i + j * rows] = e;
            denom += e;
        }
        for j in 0..cols {
            dst[i + j * rows] = dst[i + j * rows] / denom;
        }
    }

    Ok(out)
}
