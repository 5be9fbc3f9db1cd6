//! Backward integration hooks.
//!
//! The reverse engine calls these before reading node state; they hide
//! deletion from the VJPs entirely.

use crate::error::CheckpointError;
use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;
use crate::tensor::Tensor;

use super::recompute::recompute;

/// Ensure a node's own value and saved tensors are materialized.
///
/// Called before the engine computes the node's VJP. No-op for live nodes.
pub fn ensure_live<T: Scalar>(graph: &mut Graph<T>, id: NodeId) -> Result<(), CheckpointError> {
    if graph.node(id).value_deleted() {
        recompute(graph, id)?;
    }
    Ok(())
}

/// Ensure every direct input of a node is materialized.
///
/// Called before the engine propagates gradients to the node's inputs.
pub fn ensure_inputs_live<T: Scalar>(
    graph: &mut Graph<T>,
    id: NodeId,
) -> Result<(), CheckpointError> {
    let inputs: Vec<NodeId> = graph.node(id).inputs().to_vec();
    for input in inputs {
        if graph.node(input).value_deleted() {
            recompute(graph, input)?;
        }
    }
    Ok(())
}

/// Zero the gradient buffers of every `requires_grad` node reachable from
/// `root`.
///
/// Gradients are sized from `Node::shape()`, which answers from the cached
/// shape on deleted nodes, so this works after a deletion pass. Nodes that
/// don't require grad are skipped.
pub fn zero_grad<T: Scalar>(graph: &mut Graph<T>, root: NodeId) {
    for id in graph.topological_order(root) {
        if !graph.node(id).requires_grad() {
            continue;
        }
        let shape = graph.node(id).shape().to_vec();
        graph.node_mut(id).grad = Some(Tensor::zeros(&shape));
    }
}
