//! Operator cost oracle.

use crate::op::Op;

/// Classify an op as worth checkpointing.
///
/// Pure and advisory: the placement policies may override based on
/// footprint or budget. Expensive means recomputing the op costs more than
/// re-reading its activation would: matrix products, transcendentals, and
/// row reductions with a normalization pass. Cheap elementwise arithmetic,
/// simple activations, and shape ops are never worth pinning.
pub fn should_checkpoint(op: Op) -> bool {
    match op {
        Op::MatMul
        | Op::Exp
        | Op::Log
        | Op::Softmax
        | Op::LayerNorm { .. }
        | Op::RmsNorm { .. } => true,

        Op::Leaf
        | Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Neg
        | Op::AddScalar { .. }
        | Op::MulScalar { .. }
        | Op::Relu
        | Op::LeakyRelu { .. }
        | Op::Tanh
        | Op::Sigmoid
        | Op::Softplus
        | Op::Silu
        | Op::Transpose
        | Op::Sum
        | Op::Mean => false,

        // Stochastic ops are never deleted, so marking adds nothing.
        Op::Dropout { .. } => false,
        // Unknown cost; let footprint-based policies decide.
        Op::Custom(_) => false,
    }
}
