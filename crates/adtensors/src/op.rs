//! Forward operator tags.
//!
//! Ops are a closed tagged enum with attributes inlined, so both the
//! forward dispatch and the VJPs branch over a finite set and an unknown
//! tag during recomputation is a single explicit error.

use std::fmt;

/// Tag identifying a node's forward operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// User-supplied parameter or input; has no forward computation.
    Leaf,

    Add,
    Sub,
    Mul,
    Div,
    Neg,
    /// `x + c` with a compile-time constant.
    AddScalar { c: f64 },
    /// `x * c` with a compile-time constant.
    MulScalar { c: f64 },

    Relu,
    LeakyRelu { alpha: f64 },
    Tanh,
    Sigmoid,
    Softplus,
    Silu,
    Exp,
    Log,

    MatMul,
    Transpose,
    Sum,
    Mean,
    Softmax,
    LayerNorm { eps: f64 },
    RmsNorm { eps: f64 },

    /// Element dropout with keep-scaling; the forward pass draws a mask.
    Dropout { p: f64 },

    /// Externally computed value; not re-executable by the dispatch.
    Custom(&'static str),
}

impl Op {
    /// Whether the forward dispatch can re-execute this op from its input
    /// values alone.
    ///
    /// `Leaf` has nothing to execute, `Dropout` would need its RNG state
    /// restored, and `Custom` values were produced outside the dispatch.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Op::Leaf | Op::Dropout { .. } | Op::Custom(_))
    }

    /// Whether the op consumes randomness in its forward pass.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Op::Dropout { .. })
    }

    /// Whether this is the leaf marker.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Op::Leaf)
    }

    /// Lowercase tag name, as shown in logs, errors, and DOT output.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Leaf => "leaf",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Neg => "neg",
            Op::AddScalar { .. } => "add_scalar",
            Op::MulScalar { .. } => "mul_scalar",
            Op::Relu => "relu",
            Op::LeakyRelu { .. } => "leaky_relu",
            Op::Tanh => "tanh",
            Op::Sigmoid => "sigmoid",
            Op::Softplus => "softplus",
            Op::Silu => "silu",
            Op::Exp => "exp",
            Op::Log => "log",
            Op::MatMul => "matmul",
            Op::Transpose => "transpose",
            Op::Sum => "sum",
            Op::Mean => "mean",
            Op::Softmax => "softmax",
            Op::LayerNorm { .. } => "layer_norm",
            Op::RmsNorm { .. } => "rms_norm",
            Op::Dropout { .. } => "dropout",
            Op::Custom(name) => name,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
