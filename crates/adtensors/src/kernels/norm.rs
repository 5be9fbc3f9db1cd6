//! Row-normalization kernels.
//!
//! Both kernels return the per-row statistics alongside the value; the
//! graph stashes them as saved tensors so the VJPs don't recompute them.

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

/// Row-wise layer normalization (no affine parameters).
///
/// Returns `(y, mean, inv_std)` where `mean` and `inv_std` are
/// `[rows]`-shaped row statistics and
/// `y[i,j] = (x[i,j] - mean[i]) * inv_std[i]`.
pub fn layer_norm<T: Scalar>(
    t: &Tensor<T>,
    eps: T,
) -> Result<(Tensor<T>, Tensor<T>, Tensor<T>), TensorError> {
    check_rank2("layer_norm", t)?;

    let (rows, cols) = (t.shape()[0], t.shape()[1]);
    let n = T::from_f64(cols as f64);
    let src = t.data();

    let mut y = Tensor::<T>::zeros(&[rows, cols]);
    let mut mean = Tensor::<T>::zeros(&[rows]);
    let mut inv_std = Tensor::<T>::zeros(&[rows]);

    for i in 0..rows {
        let mut mu = T::zero();
        for j in 0..cols {
            mu += src[i + j * rows];
        }
        mu = mu / n;

        let mut var = T::zero();
        for j in 0..cols {
            let d = src[i + j * rows] - mu;
            var += d * d;
        }
        var = var / n;

        let sigma_inv = T::one() / Scalar::sqrt(var + eps);
        mean.data_mut()[i] = mu;
        inv_std.data_mut()[i] = sigma_inv;

        let dst = y.data_mut();
        for j in 0..cols {
            dst[i + j * rows] = (src[i + j * rows] - mu) * sigma_inv;
        }
    }

    Ok((y, mean, inv_std))
}

/// Row-wise RMS normalization (no gain parameter).
///
/// Returns `(y, inv_rms)` with `y[i,j] = x[i,j] * inv_rms[i]` and
/// `inv_rms[i] = 1 / sqrt(mean_j(x[i,j]^2) + eps)`.
pub fn rms_norm<T: Scalar>(t: &Tensor<T>, eps: T) -> Result<(Tensor<T>, Tensor<T>), TensorError> {
    check_rank2("rms_norm", t)?;

    let (rows, cols) = (t.shape()[0], t.shape()[1]);
    let n = T::from_f64(cols as f64);
    let src = t.data();

    let mut y = Tensor::<T>::zeros(&[rows, cols]);
    let mut inv_rms = Tensor::<T>::zeros(&[rows]);

    for i in 0..rows {
        let mut ms = T::zero();
        for j in 0..cols {
            let x = src[i + j * rows];
            ms += x * x;
        }
        ms = ms / n;

        let r = T::one() / Scalar::sqrt(ms + eps);
        inv_rms.data_mut()[i] = r;

        let dst = y.data_mut();
        for j in 0..cols {
            dst[i + j * rows] = src[i + j * rows] * r;
        }
    }

    Ok((y, inv_rms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layer_norm_rows_are_standardized() {
        let t = Tensor::from_vec(vec![1.0f64, 10.0, 2.0, 20.0, 3.0, 30.0], &[2, 3]).unwrap();
        let (y, mean, inv_std) = layer_norm(&t, 0.0).unwrap();

        assert_eq!(mean.shape(), &[2]);
        assert_eq!(inv_std.shape(), &[2]);
        for i in 0..2 {
            let row: Vec<f64> = (0..3).map(|j| y.data()[i + j * 2]).collect();
            let mu: f64 = row.iter().sum::<f64>() / 3.0;
            let var: f64 = row.iter().map(|x| (x - mu) * (x - mu)).sum::<f64>() / 3.0;
            assert_relative_eq!(mu, 0.0, epsilon = 1e-12);
            assert_relative_eq!(var, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_layer_norm_statistics() {
        let t = Tensor::from_vec(vec![2.0f64, 4.0, 6.0], &[1, 3]).unwrap();
        let (_, mean, inv_std) = layer_norm(&t, 0.0).unwrap();
        assert_relative_eq!(mean.data()[0], 4.0, epsilon = 1e-12);
        // var = ((-2)^2 + 0 + 2^2)/3 = 8/3
        assert_relative_eq!(inv_std.data()[0], 1.0 / (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_rms_norm_unit_rms() {
        let t = Tensor::from_vec(vec![3.0f64, -4.0, 12.0, 5.0], &[2, 2]).unwrap();
        let (y, inv_rms) = rms_norm(&t, 0.0).unwrap();
        assert_eq!(inv_rms.shape(), &[2]);
        for i in 0..2 {
            let ms: f64 = (0..2).map(|j| y.data()[i + j * 2].powi(2)).sum::<f64>() / 2.0;
            assert_relative_eq!(ms, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_rank_errors() {
        let t = Tensor::<f64>::ones(&[4]);
        assert!(layer_norm(&t, 1e-5).is_err());
        assert!(rms_norm(&t, 1e-5).is_err());
    }
}
