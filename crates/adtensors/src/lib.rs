//! adtensors - reverse-mode automatic differentiation for dense tensors
//! with a gradient checkpointing core.
//!
//! A forward pass builds a dynamic computation graph eagerly; the backward
//! pass accumulates gradients on leaf parameters. Training deep graphs
//! stores every intermediate activation, so memory grows with depth.
//! The checkpoint core trades recomputation for memory: a placement policy
//! keeps a subset of nodes resident, the rest are released after the
//! forward pass and transparently replayed when the backward pass needs
//! them, with bit-identical results.
//!
//! # Architecture
//!
//! ```text
//! Graph<T> (arena)  ──builder ops──►  Node { op, inputs, value, saved, … }
//!      │                                       │
//!      ▼                                       ▼
//! backward(graph, root)            checkpoint annotations
//!      │                            (is_checkpoint, value_deleted,
//!      ▼                             cached_shape, footprint, priority)
//! ensure_live / ensure_inputs_live             │
//!      │                                       ▼
//!      └────────► recompute ◄── CheckpointManager (policy, stats)
//! ```
//!
//! # Example
//!
//! ```
//! use adtensors::{CheckpointManager, Graph, Policy, Tensor, backward};
//!
//! let mut g: Graph<f64> = Graph::new();
//! let x = g.leaf_named(Tensor::ones(&[4, 8]), true, "x");
//! let w = g.leaf_named(Tensor::random(&[8, 8]), true, "w");
//! let h = g.matmul(x, w).unwrap();
//! let a = g.relu(h).unwrap();
//! let loss = g.sum(a).unwrap();
//!
//! // Mark checkpoints, release the rest, run backward; gradients come
//! // out identical to a run without checkpointing.
//! let mut manager = CheckpointManager::with_policy(Policy::Adaptive);
//! manager.analyze_and_mark(&mut g, loss);
//! manager.delete_unmarked(&mut g, loss);
//! backward(&mut g, loss).unwrap();
//!
//! assert_eq!(g.node(w).grad().unwrap().shape(), &[8, 8]);
//! ```

pub mod backward;
pub mod checkpoint;
pub mod dot;
pub mod error;
pub mod eval;
pub mod graph;
pub mod kernels;
pub mod op;
pub mod random;
pub mod scalar;
pub mod tensor;
pub mod vjp;

pub use backward::backward;
pub use checkpoint::{
    CheckpointManager, CheckpointStats, Policy, delete_unmarked, ensure_inputs_live, ensure_live,
    recompute, should_checkpoint, zero_grad,
};
pub use error::{CheckpointError, TensorError};
pub use eval::{EvalOutput, forward_eval};
pub use graph::{Graph, Node, NodeId};
pub use op::Op;
pub use scalar::{DType, Scalar};
pub use tensor::Tensor;
