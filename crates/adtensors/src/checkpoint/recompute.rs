//! Recomputation engine.
//!
//! Re-materializes a deleted value on demand by replaying forward ops from
//! the nearest live ancestor.

use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::error::{CheckpointError, TensorError};
use crate::eval::forward_eval;
use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;

/// Ensure `target` holds the value the original forward pass produced.
///
/// No-op when the target is already live. Otherwise: locate an anchor
/// (nearest live-valued non-leaf ancestor), collect the deleted nodes the
/// target transitively depends on, refuse early if any of them cannot be
/// replayed, then re-execute their forward ops in topological order. On
/// return the target and every node on the replay path are live, with
/// values element-wise identical to the original forward pass (same
/// kernels, same inputs).
///
/// # Errors
///
/// - [`CheckpointError::NoCheckpointReachable`]: no live non-leaf
///   ancestor exists. Reaching a leaf does not count: a deleted node whose
///   whole ancestry is leaves means placement failed to keep an anchor
///   alive for it, which is exactly the condition this error reports.
/// - [`CheckpointError::UnsupportedOpDuringRecompute`]: an op on the
///   path has no dispatch entry.
/// - [`CheckpointError::StochasticOpOnDeletedPath`]: a stochastic op on
///   the path cannot be replayed without its RNG state.
/// - [`CheckpointError::ShapeMismatch`]: a replayed value contradicts
///   the shape cached at deletion time.
pub fn recompute<T: Scalar>(graph: &mut Graph<T>, target: NodeId) -> Result<(), CheckpointError> {
    if !graph.node(target).value_deleted() {
        return Ok(());
    }

    let anchor = find_anchor(graph, target)?;
    let path = replay_path(graph, target);

    // Refuse before mutating anything, so a failed recomputation never
    // leaves the graph mid-replay.
    for &id in &path {
        let op = graph.node(id).op();
        if op.is_stochastic() {
            return Err(CheckpointError::StochasticOpOnDeletedPath { node: id, op });
        }
        if !op.is_replayable() {
            return Err(CheckpointError::UnsupportedOpDuringRecompute { node: id, op });
        }
    }

    debug!(
        "checkpoint: recomputing {} from anchor {} ({} node(s))",
        target,
        anchor,
        path.len()
    );

    for &id in &path {
        let out = {
            let node = graph.node(id);
            let mut vals = Vec::with_capacity(node.inputs().len());
            for &input in node.inputs() {
                // Holds by construction: the input is either live or
                // earlier in the path (smaller id).
                let v = graph.node(input).value().ok_or_else(|| {
                    TensorError::InvalidOperation(format!(
                        "replay of {id}: input {input} has no live value"
                    ))
                })?;
                vals.push(v);
            }
            forward_eval(node.op(), &vals)?
        };

        {
            let node = graph.node(id);
            if !node.cached_shape().is_empty() && node.cached_shape() != out.value.shape() {
                return Err(CheckpointError::ShapeMismatch {
                    node: id,
                    expected: node.cached_shape().to_vec(),
                    actual: out.value.shape().to_vec(),
                });
            }
        }

        let node = graph.node_mut(id);
        node.value = Some(out.value);
        node.saved = out.saved;
        node.value_deleted = false;
    }

    graph.bump_recompute_count();
    debug_assert!(!graph.node(target).value_deleted());
    Ok(())
}

/// BFS backward from `target` through input edges for the first node with
/// a live, non-empty value. Leaves never qualify; the nearest one seen is
/// reported in the failure.
fn find_anchor<T: Scalar>(graph: &Graph<T>, target: NodeId) -> Result<NodeId, CheckpointError> {
    let mut queue: VecDeque<NodeId> = graph.node(target).inputs().iter().copied().collect();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut nearest_leaf = None;

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let node = graph.node(id);
        if node.is_leaf() {
            if nearest_leaf.is_none() {
                nearest_leaf = Some(id);
            }
            continue;
        }
        if !node.value_deleted() && node.has_value() {
            return Ok(id);
        }
        for &input in node.inputs() {
            if !visited.contains(&input) {
                queue.push_back(input);
            }
        }
    }

    Err(CheckpointError::NoCheckpointReachable {
        target,
        nearest_leaf,
    })
}

/// Deleted nodes the target transitively depends on (itself included),
/// in topological order. Traversal stops at live nodes: their values are
/// already usable as replay inputs.
fn replay_path<T: Scalar>(graph: &Graph<T>, target: NodeId) -> Vec<NodeId> {
    let mut set: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![target];
    while let Some(id) = stack.pop() {
        if !set.insert(id) {
            continue;
        }
        for &input in graph.node(id).inputs() {
            if graph.node(input).value_deleted() && !set.contains(&input) {
                stack.push(input);
            }
        }
    }
    let mut path: Vec<NodeId> = set.into_iter().collect();
    // Ascending id is a topological order: inputs precede consumers.
    path.sort_unstable();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::delete::delete_unmarked;
    use crate::tensor::Tensor;

    #[test]
    fn test_recompute_restores_identical_value() {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::from_vec(vec![0.5, -1.5, 2.0, 0.0], &[2, 2]).unwrap(), true);
        let h = g.tanh(x).unwrap();
        let r = g.exp(h).unwrap();
        let root = g.sum(r).unwrap();
        g.checkpoint(h);
        g.checkpoint(root);

        let original = g.node(r).value().unwrap().clone();
        delete_unmarked(&mut g, root);
        assert!(g.node(r).value_deleted());

        recompute(&mut g, r).unwrap();

        assert!(!g.node(r).value_deleted());
        assert_eq!(g.node(r).value().unwrap().data(), original.data());
        assert_eq!(g.recompute_count(), 1);
    }

    #[test]
    fn test_recompute_noop_when_live() {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[2]), true);
        let y = g.exp(x).unwrap();

        recompute(&mut g, y).unwrap();
        assert_eq!(g.recompute_count(), 0);
    }

    #[test]
    fn test_recompute_restores_whole_path() {
        // Chain with a checkpoint at the head; deleting the middle forces
        // a two-node replay.
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap(), true);
        let a = g.exp(x).unwrap();
        let b = g.add_scalar(a, 1.0).unwrap();
        let c = g.mul_scalar(b, 3.0).unwrap();
        let root = g.sum(c).unwrap();
        g.checkpoint(a);
        g.checkpoint(root);

        delete_unmarked(&mut g, root);
        assert!(g.node(b).value_deleted());
        assert!(g.node(c).value_deleted());

        recompute(&mut g, c).unwrap();

        assert!(!g.node(b).value_deleted());
        assert!(!g.node(c).value_deleted());
        assert_eq!(g.recompute_count(), 1);
    }

    #[test]
    fn test_no_checkpoint_reachable_names_nearest_leaf() {
        // b = exp(a); c = sum(b); nothing marked, so deletion takes both
        // interior nodes and b has only the leaf above it.
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[3]), true);
        let b = g.exp(a).unwrap();
        let root = g.sum(b).unwrap();

        delete_unmarked(&mut g, root);
        assert!(g.node(b).value_deleted());

        match recompute(&mut g, b) {
            Err(CheckpointError::NoCheckpointReachable {
                target,
                nearest_leaf,
            }) => {
                assert_eq!(target, b);
                assert_eq!(nearest_leaf, Some(a));
            }
            other => panic!("expected NoCheckpointReachable, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_op_refused_before_mutation() {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[2]), true);
        let a = g.relu(x).unwrap();
        let m = g
            .custom("fused_block", &[a], Tensor::from_vec(vec![2.0, 2.0], &[2]).unwrap())
            .unwrap();
        let y = g.exp(m).unwrap();
        let root = g.sum(y).unwrap();
        g.checkpoint(a);
        g.checkpoint(root);

        delete_unmarked(&mut g, root);
        assert!(g.node(m).value_deleted());

        match recompute(&mut g, m) {
            Err(CheckpointError::UnsupportedOpDuringRecompute { node, op }) => {
                assert_eq!(node, m);
                assert_eq!(op.to_string(), "fused_block");
            }
            other => panic!("expected UnsupportedOpDuringRecompute, got {other:?}"),
        }
        // Refusal happened before any node was restored.
        assert!(g.node(m).value_deleted());
        assert_eq!(g.recompute_count(), 0);
    }

    #[test]
    fn test_diamond_recompute_uses_common_anchor() {
        // a -> b, a -> c, (b, c) -> d with a and d checkpointed.
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap(), true);
        let a = g.exp(x).unwrap();
        let b = g.mul_scalar(a, 2.0).unwrap();
        let c = g.add_scalar(a, 1.0).unwrap();
        let d = g.add(b, c).unwrap();
        g.checkpoint(a);
        g.checkpoint(d);

        let b_orig = g.node(b).value().unwrap().clone();
        let c_orig = g.node(c).value().unwrap().clone();

        delete_unmarked(&mut g, d);
        assert!(g.node(b).value_deleted());
        assert!(g.node(c).value_deleted());

        recompute(&mut g, b).unwrap();
        recompute(&mut g, c).unwrap();

        assert_eq!(g.node(b).value().unwrap().data(), b_orig.data());
        assert_eq!(g.node(c).value().unwrap().data(), c_orig.data());
        assert_eq!(g.recompute_count(), 2);
    }

    #[test]
    fn test_recompute_side_branch_dependency() {
        // t = u * v where both u and v were deleted; replaying t must
        // materialize both branches even though the anchor search only
        // follows one of them first.
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap(), true);
        let anchor = g.exp(x).unwrap();
        let u = g.mul_scalar(anchor, 2.0).unwrap();
        let v = g.add_scalar(anchor, 3.0).unwrap();
        let t = g.mul(u, v).unwrap();
        let root = g.sum(t).unwrap();
        g.checkpoint(anchor);
        g.checkpoint(root);

        let t_orig = g.node(t).value().unwrap().clone();
        delete_unmarked(&mut g, root);

        recompute(&mut g, t).unwrap();

        assert!(!g.node(u).value_deleted());
        assert!(!g.node(v).value_deleted());
        assert_eq!(g.node(t).value().unwrap().data(), t_orig.data());
    }
}
