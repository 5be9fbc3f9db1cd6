//! GEMM-backed matrix kernels.
//!
//! Tensors are column-major, same as faer, so 2-D tensors view into faer
//! matrices without copying.

use faer::linalg::matmul::matmul as faer_matmul;
use faer::{Accum, MatMut, MatRef, Par};

use crate::error::TensorError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

fn check_rank2<T: Scalar>(op: &'static str, t: &Tensor<T>) -> Result<(), TensorError> {
    if t.ndim() != 2 {
        return Err(TensorError::RankMismatch {
            op,
            expected: 2,
            actual: t.ndim(),
        });
    }
    Ok(())
}

/// Matrix product `C[m,n] = A[m,k] @ B[k,n]`.
///
/// # Example
///
/// ```
/// use adtensors::Tensor;
/// use adtensors::kernels::matmul;
///
/// let a = Tensor::<f64>::ones(&[2, 3]);
/// let b = Tensor::<f64>::ones(&[3, 4]);
/// let c = matmul(&a, &b).unwrap();
/// assert_eq!(c.shape(), &[2, 4]);
/// assert_eq!(*c.get(&[0, 0]).unwrap(), 3.0);
/// ```
pub fn matmul<T: Scalar>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
    check_rank2("matmul", a)?;
    check_rank2("matmul", b)?;

    let (m, k) = (a.shape()[0], a.shape()[1]);
    let (kb, n) = (b.shape()[0], b.shape()[1]);
    if k != kb {
        return Err(TensorError::IncompatibleShapes {
            op: "matmul",
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }

    let a_mat = MatRef::from_column_major_slice(a.data(), m, k);
    let b_mat = MatRef::from_column_major_slice(b.data(), k, n);

    let mut c = Tensor::<T>::zeros(&[m, n]);
    let c_mat = MatMut::from_column_major_slice_mut(c.data_mut(), m, n);

    faer_matmul(c_mat, Accum::Replace, a_mat, b_mat, T::one(), Par::Seq);

    Ok(c)
}

/// Matrix transpose of a 2-D tensor.
///
/// # Example
///
/// ```
/// use adtensors::Tensor;
/// use adtensors::kernels::transpose;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let tt = transpose(&t).unwrap();
/// assert_eq!(tt.shape(), &[3, 2]);
/// assert_eq!(tt.get(&[2, 1]), t.get(&[1, 2]));
/// ```
pub fn transpose<T: Scalar>(t: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
    check_rank2("transpose", t)?;

    let (m, n) = (t.shape()[0], t.shape()[1]);
    let mut out = Tensor::<T>::zeros(&[n, m]);
    let src = t.data();
    let dst = out.data_mut();
    for j in 0..n {
        for i in 0..m {
            dst[j + i * n] = src[i + j * m];
        }
    }
    Ok(out)
}
