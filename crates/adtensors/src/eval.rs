//! Forward execution dispatch.
//!
//! One table maps op tags to kernels. Graph construction and the
//! recomputation engine both go through [`forward_eval`], so a replayed
//! node runs exactly the kernel that produced its original value.

use crate::error::TensorError;
use crate::kernels;
use crate::op::Op;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Result of executing one forward op: the node value plus any tensors the
/// op stashes for its VJP.
#[derive(Debug, Clone)]
pub struct EvalOutput<T: Scalar> {
    pub value: Tensor<T>,
    pub saved: Vec<Tensor<T>>,
}

impl<T: Scalar> EvalOutput<T> {
    fn plain(value: Tensor<T>) -> Self {
        Self {
            value,
            saved: Vec::new(),
        }
    }
}

fn arity_error(op: Op, expected: usize, actual: usize) -> TensorError {
    TensorError::InvalidOperation(format!(
        "op `{op}` expects {expected} input(s), got {actual}"
    ))
}

fn unary<'a, T: Scalar>(op: Op, inputs: &[&'a Tensor<T>]) -> Result<&'a Tensor<T>, TensorError> {
    match inputs {
        [x] => Ok(*x),
        _ => Err(arity_error(op, 1, inputs.len())),
    }
}

fn binary<'a, T: Scalar>(
    op: Op,
    inputs: &[&'a Tensor<T>],
) -> Result<(&'a Tensor<T>, &'a Tensor<T>), TensorError> {
    match inputs {
        [a, b] => Ok((*a, *b)),
        _ => Err(arity_error(op, 2, inputs.len())),
    }
}

/// Execute one forward op on already-materialized input values.
///
/// Side-effect free: the output is a function of `op` and `inputs` only.
/// `Leaf`, `Dropout`, and `Custom` have no entry here (see
/// [`Op::is_replayable`]); applying them is an invalid-operation error.
pub fn forward_eval<T: Scalar>(op: Op, inputs: &[&Tensor<T>]) -> Result<EvalOutput<T>, TensorError> {
    match op {
        Op::Add => {
            let (a, b) = binary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::zip_map("add", a, b, |x, y| {
                x + y
            })?))
        }
        Op::Sub => {
            let (a, b) = binary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::zip_map("sub", a, b, |x, y| {
                x - y
            })?))
        }
        Op::Mul => {
            let (a, b) = binary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::zip_map("mul", a, b, |x, y| {
                x * y
            })?))
        }
        Op::Div => {
            let (a, b) = binary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::zip_map("div", a, b, |x, y| {
                x / y
            })?))
        }
        Op::Neg => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::map(x, |v| -v)))
        }
        Op::AddScalar { c } => {
            let x = unary(op, inputs)?;
            let c = T::from_f64(c);
            Ok(EvalOutput::plain(kernels::map(x, |v| v + c)))
        }
        Op::MulScalar { c } => {
            let x = unary(op, inputs)?;
            let c = T::from_f64(c);
            Ok(EvalOutput::plain(kernels::map(x, |v| v * c)))
        }
        Op::Relu => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::relu(x)))
        }
        Op::LeakyRelu { alpha } => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::leaky_relu(x, T::from_f64(alpha))))
        }
        Op::Tanh => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::tanh(x)))
        }
        Op::Sigmoid => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::sigmoid(x)))
        }
        Op::Softplus => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::softplus(x)))
        }
        Op::Silu => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::silu(x)))
        }
        Op::Exp => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::exp(x)))
        }
        Op::Log => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::log(x)))
        }
        Op::MatMul => {
            let (a, b) = binary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::matmul(a, b)?))
        }
        Op::Transpose => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::transpose(x)?))
        }
        Op::Sum => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::sum_all(x)))
        }
        Op::Mean => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::mean_all(x)))
        }
        Op::Softmax => {
            let x = unary(op, inputs)?;
            Ok(EvalOutput::plain(kernels::softmax_rows(x)?))
        }
        Op::LayerNorm { eps } => {
            let x = unary(op, inputs)?;
            let (y, mean, inv_std) = kernels::layer_norm(x, T::from_f64(eps))?;
            Ok(EvalOutput {
                value: y,
                saved: vec![mean, inv_std],
            })
        }
        Op::RmsNorm { eps } => {
            let x = unary(op, inputs)?;
            let (y, inv_rms) = kernels::rms_norm(x, T::from_f64(eps))?;
            Ok(EvalOutput {
                value: y,
                saved: vec![inv_rms],
            })
        }
        Op::Leaf | Op::Dropout { .. } | Op::Custom(_) => Err(TensorError::InvalidOperation(
            format!("op `{op}` has no forward dispatch entry"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dispatch() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0], &[2]).unwrap();
        let out = forward_eval(Op::Add, &[&a, &b]).unwrap();
        assert_eq!(out.value.data(), &[4.0, 6.0]);
        assert!(out.saved.is_empty());
    }

    #[test]
    fn test_arity_check() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        assert!(forward_eval(Op::Add, &[&a]).is_err());
        assert!(forward_eval(Op::Relu, &[&a, &a]).is_err());
    }

    #[test]
    fn test_layer_norm_saves_statistics() {
        let x = Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let out = forward_eval(Op::LayerNorm { eps: 1e-5 }, &[&x]).unwrap();
        assert_eq!(out.value.shape(), &[2, 3]);
        assert_eq!(out.saved.len(), 2);
        assert_eq!(out.saved[0].shape(), &[2]);
        assert_eq!(out.saved[1].shape(), &[2]);
    }

    #[test]
    fn test_no_entry_for_custom_and_dropout() {
        let a = Tensor::<f64>::ones(&[2]);
        assert!(forward_eval(Op::Custom("fused"), &[&a]).is_err());
        assert!(forward_eval(Op::Dropout { p: 0.5 }, &[&a]).is_err());
        assert!(forward_eval::<f64>(Op::Leaf, &[]).is_err());
    }

    #[test]
    fn test_determinism() {
        let a = Tensor::from_vec(vec![0.3f64, -1.2, 2.5, 0.0], &[2, 2]).unwrap();
        let b = Tensor::from_vec(vec![1.0f64, 0.5, -0.5, 2.0], &[2, 2]).unwrap();
        let first = forward_eval(Op::MatMul, &[&a, &b]).unwrap();
        let second = forward_eval(Op::MatMul, &[&a, &b]).unwrap();
        assert_eq!(first.value.data(), second.value.data());
    }
}
