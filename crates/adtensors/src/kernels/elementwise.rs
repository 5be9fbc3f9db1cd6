//! Element-wise forward kernels.
//!
//! The combinators allocate the output tensor up front and write into it;
//! nothing here can panic on shapes (mismatches come back as errors, and
//! the accumulator asserts shapes only in debug builds because gradient
//! shapes are fixed by the VJPs that produce them).

use crate::error::TensorError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Map `f` over every element into a fresh tensor of the same shape.
///
/// # Example
///
/// ```
/// use adtensors::Tensor;
/// use adtensors::kernels::map;
///
/// let t = Tensor::from_vec(vec![1.0, 4.0, 9.0], &[3]).unwrap();
/// let ts = map(&t, |x: f64| x.sqrt());
/// assert!((ts.data()[1] - 2.0).abs() < 1e-10);
/// ```
pub fn map<T: Scalar, F>(tensor: &Tensor<T>, f: F) -> Tensor<T>
where
    F: Fn(T) -> T,
{
    let mut out = Tensor::zeros(tensor.shape());
    for (dst, &src) in out.data_mut().iter_mut().zip(tensor.data()) {
        *dst = f(src);
    }
    out
}

/// Combine two tensors element-wise.
///
/// Shapes must match exactly. There is no implicit broadcasting; constant
/// operands go through the scalar-attribute ops instead. `op` names the
/// caller in the mismatch error.
///
/// # Example
///
/// ```
/// use adtensors::Tensor;
/// use adtensors::kernels::zip_map;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
/// let b = Tensor::from_vec(vec![4.0, 5.0, 6.0], &[3]).unwrap();
/// let c = zip_map("add", &a, &b, |x, y| x + y).unwrap();
/// assert_eq!(c.data(), &[5.0, 7.0, 9.0]);
/// ```
pub fn zip_map<T: Scalar, F>(
    op: &'static str,
    a: &Tensor<T>,
    b: &Tensor<T>,
    f: F,
) -> Result<Tensor<T>, TensorError>
where
    F: Fn(T, T) -> T,
{
    if a.shape() != b.shape() {
        return Err(TensorError::IncompatibleShapes {
            op,
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }
    let mut out = Tensor::zeros(a.shape());
    for ((dst, &x), &y) in out.data_mut().iter_mut().zip(a.data()).zip(b.data()) {
        *dst = f(x, y);
    }
    Ok(out)
}

/// Accumulate `src` into `dst` element-wise, in place.
///
/// This is the gradient-accumulation primitive: the backward pass adds
/// each incoming contribution into the buffer a node already holds
/// instead of allocating a fresh tensor per path. Shapes are fixed by the
/// emitting VJP, so they are only checked in debug builds.
pub fn add_assign<T: Scalar>(dst: &mut Tensor<T>, src: &Tensor<T>) {
    debug_assert_eq!(dst.shape(), src.shape());
    for (d, &s) in dst.data_mut().iter_mut().zip(src.data()) {
        *d += s;
    }
}

/// Logistic sigmoid of a single value.
#[inline]
pub fn sigmoid_scalar<T: Scalar>(x: T) -> T {
    T::one() / (T::one() + Scalar::exp(-x))
}

/// Rectified linear unit: max(0, x).
pub fn relu<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| if x > T::zero() { x } else { T::zero() })
}

/// Leaky ReLU with negative slope `alpha`.
pub fn leaky_relu<T: Scalar>(tensor: &Tensor<T>, alpha: T) -> Tensor<T> {
    map(tensor, |x| if x > T::zero() { x } else { alpha * x })
}

/// Hyperbolic tangent.
pub fn tanh<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| Scalar::tanh(x))
}

/// Logistic sigmoid.
pub fn sigmoid<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, sigmoid_scalar)
}

/// Element-wise exponential.
pub fn exp<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| Scalar::exp(x))
}

/// Element-wise natural logarithm.
pub fn log<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| Scalar::ln(x))
}

/// Softplus: ln(1 + e^x).
pub fn softplus<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| Scalar::ln(T::one() + Scalar::exp(x)))
}

/// SiLU (swish): x * sigmoid(x).
pub fn silu<T: Scalar>(tensor: &Tensor<T>) -> Tensor<T> {
    map(tensor, |x| x * sigmoid_scalar(x))
}
