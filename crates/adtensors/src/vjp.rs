//! Vector-Jacobian products, dispatched over the op tag.
//!
//! Each arm reads whatever it needs from the graph (input values, the
//! node's own value, saved tensors); the backward hooks have materialized
//! all of it before this is called.

use crate::error::{CheckpointError, TensorError};
use crate::graph::{Graph, NodeId};
use crate::kernels::{map, matmul, sigmoid_scalar, transpose, zip_map};
use crate::op::Op;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

fn live_value<'g, T: Scalar>(
    graph: &'g Graph<T>,
    id: NodeId,
) -> Result<&'g Tensor<T>, TensorError> {
    graph
        .node(id)
        .value()
        .ok_or_else(|| TensorError::InvalidOperation(format!("node {id} has no live value")))
}

/// Compute gradients for the inputs of `id` given the gradient flowing
/// into its output.
///
/// Returns `(input_id, gradient)` pairs, restricted to inputs that require
/// grad. Repeated inputs (e.g. `mul(a, a)`) yield one pair per edge; the
/// caller accumulates.
pub fn vjp<T: Scalar>(
    graph: &Graph<T>,
    id: NodeId,
    grad_output: &Tensor<T>,
) -> Result<Vec<(NodeId, Tensor<T>)>, CheckpointError> {
    let node = graph.node(id);
    let op = node.op();
    let inputs = node.inputs();

    let mut out: Vec<(NodeId, Tensor<T>)> = Vec::with_capacity(inputs.len());
    let mut emit = |input: NodeId, grad: Tensor<T>| {
        if graph.node(input).requires_grad() {
            out.push((input, grad));
        }
    };

    match op {
        Op::Leaf => {}

        Op::Add => {
            emit(inputs[0], grad_output.clone());
            emit(inputs[1], grad_output.clone());
        }
        Op::Sub => {
            emit(inputs[0], grad_output.clone());
            emit(inputs[1], map(grad_output, |g| -g));
        }
        Op::Mul => {
            let a = live_value(graph, inputs[0])?;
            let b = live_value(graph, inputs[1])?;
            emit(inputs[0], zip_map("mul_vjp", grad_output, b, |g, y| g * y)?);
            emit(inputs[1], zip_map("mul_vjp", grad_output, a, |g, x| g * x)?);
        }
        Op::Div => {
            let a = live_value(graph, inputs[0])?;
            let b = live_value(graph, inputs[1])?;
            emit(inputs[0], zip_map("div_vjp", grad_output, b, |g, y| g / y)?);
            let mut db = zip_map("div_vjp", grad_output, a, |g, x| g * x)?;
            db = zip_map("div_vjp", &db, b, |v, y| -(v / (y * y)))?;
            emit(inputs[1], db);
        }
        Op::Neg => {
            emit(inputs[0], map(grad_output, |g| -g));
        }
        Op::AddScalar { .. } => {
            emit(inputs[0], grad_output.clone());
        }
        Op::MulScalar { c } => {
            let c = T::from_f64(c);
            emit(inputs[0], map(grad_output, |g| g * c));
        }

        Op::Relu => {
            let x = live_value(graph, inputs[0])?;
            emit(
                inputs[0],
                zip_map("relu_vjp", grad_output, x, |g, v| {
                    if v > T::zero() { g } else { T::zero() }
                })?,
            );
        }
        Op::LeakyRelu { alpha } => {
            let x = live_value(graph, inputs[0])?;
            let a = T::from_f64(alpha);
            emit(
                inputs[0],
                zip_map("leaky_relu_vjp", grad_output, x, |g, v| {
                    if v > T::zero() { g } else { g * a }
                })?,
            );
        }
        Op::Tanh => {
            let y = live_value(graph, id)?;
            emit(
                inputs[0],
                zip_map("tanh_vjp", grad_output, y, |g, t| g * (T::one() - t * t))?,
            );
        }
        Op::Sigmoid => {
            let y = live_value(graph, id)?;
            emit(
                inputs[0],
                zip_map("sigmoid_vjp", grad_output, y, |g, s| g * s * (T::one() - s))?,
            );
        }
        Op::Softplus => {
            let x = live_value(graph, inputs[0])?;
            emit(
                inputs[0],
                zip_map("softplus_vjp", grad_output, x, |g, v| g * sigmoid_scalar(v))?,
            );
        }
        Op::Silu => {
            let x = live_value(graph, inputs[0])?;
            emit(
                inputs[0],
                zip_map("silu_vjp", grad_output, x, |g, v| {
                    let s = sigmoid_scalar(v);
                    g * (s + v * s * (T::one() - s))
                })?,
            );
        }
        Op::Exp => {
            let y = live_value(graph, id)?;
            emit(inputs[0], zip_map("exp_vjp", grad_output, y, |g, e| g * e)?);
        }
        Op::Log => {
            let x = live_value(graph, inputs[0])?;
            emit(inputs[0], zip_map("log_vjp", grad_output, x, |g, v| g / v)?);
        }

        Op::MatMul => {
            let a = live_value(graph, inputs[0])?;
            let b = live_value(graph, inputs[1])?;
            emit(inputs[0], matmul(grad_output, &transpose(b)?)?);
            emit(inputs[1], matmul(&transpose(a)?, grad_output)?);
        }
        Op::Transpose => {
            emit(inputs[0], transpose(grad_output)?);
        }
        Op::Sum => {
            let x = graph.node(inputs[0]);
            let g0 = grad_output.data()[0];
            emit(inputs[0], Tensor::full(x.shape(), g0));
        }
        Op::Mean => {
            let x = graph.node(inputs[0]);
            let n = T::from_f64(x.shape().iter().product::<usize>().max(1) as f64);
            let g0 = grad_output.data()[0] / n;
            emit(inputs[0], Tensor::full(x.shape(), g0));
        }

        Op::Softmax => {
            let y = live_value(graph, id)?;
            let (rows, cols) = (y.shape()[0], y.shape()[1]);
            let mut dx = Tensor::<T>::zeros(&[rows, cols]);
            for i in 0..rows {
                let mut dot = T::zero();
                for j in 0..cols {
                    dot += grad_output.data()[i + j * rows] * y.data()[i + j * rows];
                }
                for j in 0..cols {
                    let yi = y.data()[i + j * rows];
                    dx.data_mut()[i + j * rows] = yi * (grad_output.data()[i + j * rows] - dot);
                }
            }
            emit(inputs[0], dx);
        }
        Op::LayerNorm { .. } => {
            let x = live_value(graph, inputs[0])?;
            let saved = graph.node(id).saved();
            let (mean, inv_std) = (&saved[0], &saved[1]);
            let (rows, cols) = (x.shape()[0], x.shape()[1]);
            let n = T::from_f64(cols as f64);
            let mut dx = Tensor::<T>::zeros(&[rows, cols]);
            for i in 0..rows {
                let mu = mean.data()[i];
                let sigma_inv = inv_std.data()[i];
                let mut g_mean = T::zero();
                let mut gy_mean = T::zero();
                for j in 0..cols {
                    let g = grad_output.data()[i + j * rows];
                    let y = (x.data()[i + j * rows] - mu) * sigma_inv;
                    g_mean += g;
                    gy_mean += g * y;
                }
                g_mean = g_mean / n;
                gy_mean = gy_mean / n;
                for j in 0..cols {
                    let g = grad_output.data()[i + j * rows];
                    let y = (x.data()[i + j * rows] - mu) * sigma_inv;
                    dx.data_mut()[i + j * rows] = sigma_inv * (g - g_mean - y * gy_mean);
                }
            }
            emit(inputs[0], dx);
        }
        Op::RmsNorm { .. } => {
            let x = live_value(graph, inputs[0])?;
            let inv_rms = &graph.node(id).saved()[0];
            let (rows, cols) = (x.shape()[0], x.shape()[1]);
            let n = T::from_f64(cols as f64);
            let mut dx = Tensor::<T>::zeros(&[rows, cols]);
            for i in 0..rows {
                let r = inv_rms.data()[i];
                let mut gx_mean = T::zero();
                for j in 0..cols {
                    gx_mean += grad_output.data()[i + j * rows] * x.data()[i + j * rows];
                }
                gx_mean = gx_mean / n;
                for j in 0..cols {
                    let g = grad_output.data()[i + j * rows];
                    let xv = x.data()[i + j * rows];
                    dx.data_mut()[i + j * rows] = r * g - xv * r * r * r * gx_mean;
                }
            }
            emit(inputs[0], dx);
        }

        Op::Dropout { .. } => {
            let mask = &graph.node(id).saved()[0];
            emit(
                inputs[0],
                zip_map("dropout_vjp", grad_output, mask, |g, m| g * m)?,
            );
        }

        Op::Custom(name) => {
            return Err(CheckpointError::Tensor(TensorError::InvalidOperation(
                format!("op `{name}` has no VJP; gradients cannot flow through node {id}"),
            )));
        }
    }

    Ok(out)
}
