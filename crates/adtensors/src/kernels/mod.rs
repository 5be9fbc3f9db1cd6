//! Forward kernels consumed by the op dispatch and the VJPs.

mod elementwise;
mod matmul;
mod norm;
mod reduce;

pub use elementwise::{
    add_assign, exp, leaky_relu, log, map, relu, sigmoid, sigmoid_scalar, silu, softplus, tanh,
    zip_map,
};
pub use matmul::{matmul, transpose};
pub use norm::{layer_norm, rms_norm};
pub use reduce::{mean_all, softmax_rows, sum_all};
