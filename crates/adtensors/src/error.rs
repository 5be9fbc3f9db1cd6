//! Error types for adtensors.

use crate::graph::NodeId;
use crate::op::Op;
use thiserror::Error;

/// Errors raised by the tensor and kernel layer.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Incompatible operand shapes for a kernel.
    #[error("{op}: incompatible shapes {left:?} and {right:?}")]
    IncompatibleShapes {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// A kernel was applied to a tensor of unsupported rank.
    #[error("{op}: expected a rank-{expected} tensor, got rank {actual}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Catch-all for invalid graph or kernel usage.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors raised by the checkpoint core.
///
/// The first four kinds propagate out of the recomputation engine, through
/// the backward hooks, and abort the backward pass; `ConfigInvalid` is
/// returned synchronously from manager setters.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The anchor search exhausted the ancestor DAG without finding a live
    /// non-leaf value.
    #[error("no live checkpoint reachable from node {target} (nearest leaf: {nearest_leaf:?})")]
    NoCheckpointReachable {
        target: NodeId,
        nearest_leaf: Option<NodeId>,
    },

    /// A node on the replay path carries an op with no forward dispatch
    /// entry. Mark the node as a checkpoint or extend the dispatch.
    #[error("op `{op}` at node {node} cannot be re-executed during recomputation")]
    UnsupportedOpDuringRecompute { node: NodeId, op: Op },

    /// A replayed forward op produced a tensor whose shape differs from the
    /// shape cached at deletion time.
    #[error("recomputed node {node} has shape {actual:?}, cached shape was {expected:?}")]
    ShapeMismatch {
        node: NodeId,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A stochastic op sits on a replay path and RNG state capture is not
    /// available.
    #[error("stochastic op `{op}` at node {node} lies on a deleted path; rng replay is unsupported")]
    StochasticOpOnDeletedPath { node: NodeId, op: Op },

    /// Rejected manager configuration.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Kernel failure during replay.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
