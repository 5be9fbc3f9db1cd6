//! Placement policies.
//!
//! Each strategy walks the DAG reachable from a root, sets `is_checkpoint`
//! on selected non-leaf nodes, and returns how many nodes it newly marked.
//! The root is always marked; leaves never are (they are never deleted, so
//! marking them adds nothing).

use log::debug;

use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;

fn mark<T: Scalar>(graph: &mut Graph<T>, id: NodeId, marked: &mut usize) {
    let node = graph.node(id);
    if node.is_leaf() || node.is_checkpoint() {
        return;
    }
    debug!("checkpoint: marked {} ({})", id, node.op());
    graph.checkpoint(id);
    *marked += 1;
}

/// Pin nodes whose inputs are all leaves.
///
/// A deleted node with no non-leaf ancestor has no possible replay anchor
/// (leaves never anchor), so every upward chain must terminate at a marked
/// node. Pinning the first layer is the minimal way to guarantee that for
/// an arbitrary DAG.
fn mark_first_layer<T: Scalar>(graph: &mut Graph<T>, order: &[NodeId], marked: &mut usize) {
    for &id in order {
        let node = graph.node(id);
        if node.is_leaf() {
            continue;
        }
        if node.inputs().iter().all(|&i| graph.node(i).is_leaf()) {
            mark(graph, id, marked);
        }
    }
}

/// Uniform placement: every `interval`-th non-leaf node.
///
/// Non-leaf nodes are numbered 0..N-1 in topological order (root last);
/// node `i` is marked iff `i % interval == 0` or it is the root.
/// Deterministic, O(N). Numbering starts at a marked node, so on a chain
/// every deleted node keeps a checkpoint within `interval` steps above it.
pub fn mark_uniform<T: Scalar>(graph: &mut Graph<T>, root: NodeId, interval: usize) -> usize {
    let order = graph.topological_order(root);
    let mut marked = 0;
    let mut i = 0;
    for &id in &order {
        if graph.node(id).is_leaf() {
            continue;
        }
        if i % interval == 0 || id == root {
            mark(graph, id, &mut marked);
        }
        i += 1;
    }
    mark_first_layer(graph, &order, &mut marked);
    marked
}

/// Adaptive placement: ~sqrt(N) checkpoints, expensive ops first.
///
/// Computes `target = ceil(sqrt(N))` over the N non-leaf reachable nodes
/// (Chen et al., sublinear memory cost for a uniform chain), then ranks
/// candidates by `(recompute_priority, memory_footprint)` descending; the
/// bias toward expensive, large activations is what adapts the chain
/// result to heterogeneous graphs. The top `target` candidates are marked
/// in addition to the root.
///
/// Run the footprint annotation pass first; unannotated nodes all rank
/// equal.
pub fn mark_adaptive<T: Scalar>(graph: &mut Graph<T>, root: NodeId) -> usize {
    let order = graph.topological_order(root);
    let non_leaf: Vec<NodeId> = order
        .iter()
        .copied()
        .filter(|&id| !graph.node(id).is_leaf())
        .collect();

    if non_leaf.is_empty() {
        return 0;
    }

    let target = (non_leaf.len() as f64).sqrt().ceil() as usize;

    let mut candidates: Vec<NodeId> = non_leaf.iter().copied().filter(|&id| id != root).collect();
    candidates.sort_by(|&a, &b| {
        let na = graph.node(a);
        let nb = graph.node(b);
        nb.recompute_priority()
            .cmp(&na.recompute_priority())
            .then(nb.memory_footprint().cmp(&na.memory_footprint()))
            .then(a.cmp(&b))
    });

    let mut marked = 0;
    for &id in candidates.iter().take(target) {
        mark(graph, id, &mut marked);
    }
    mark(graph, root, &mut marked);
    mark_first_layer(graph, &order, &mut marked);
    marked
}

/// Budget placement: bound the live interior bytes between checkpoints.
///
/// Walks the reachable nodes in reverse topological order accumulating
/// footprints; whenever the running sum would exceed `budget_bytes`, the
/// current node is marked and the accumulator resets. Guarantees that the
/// non-checkpoint live state between any two consecutive checkpoints stays
/// at or under the budget.
pub fn mark_budget<T: Scalar>(graph: &mut Graph<T>, root: NodeId, budget_bytes: u64) -> usize {
    let order = graph.topological_order(root);
    let mut marked = 0;
    let mut acc: u64 = 0;

    for &id in order.iter().rev() {
        if graph.node(id).is_leaf() {
            continue;
        }
        if id == root {
            mark(graph, id, &mut marked);
            continue;
        }
        let fp = graph.node(id).memory_footprint();
        if acc + fp > budget_bytes {
            mark(graph, id, &mut marked);
            acc = 0;
        } else {
            acc += fp;
        }
    }
    mark_first_layer(graph, &order, &mut marked);
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::footprint::annotate;
    use crate::tensor::Tensor;

    /// x -> +1 -> *2 -> +1 -> *2 -> sum
    fn chain() -> (Graph<f64>, NodeId, Vec<NodeId>) {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[4]), true);
        let n1 = g.add_scalar(x, 1.0).unwrap();
        let n2 = g.mul_scalar(n1, 2.0).unwrap();
        let n3 = g.add_scalar(n2, 1.0).unwrap();
        let n4 = g.mul_scalar(n3, 2.0).unwrap();
        let n5 = g.sum(n4).unwrap();
        (g, n5, vec![x, n1, n2, n3, n4, n5])
    }

    #[test]
    fn test_uniform_marks_every_kth_and_root() {
        let (mut g, root, nodes) = chain();
        let marked = mark_uniform(&mut g, root, 2);

        // Non-leaf order is [n1..n5]; indices 0, 2, 4 match the interval
        // and n5 is the root.
        assert_eq!(marked, 3);
        assert!(!g.node(nodes[0]).is_checkpoint()); // leaf
        assert!(g.node(nodes[1]).is_checkpoint());
        assert!(!g.node(nodes[2]).is_checkpoint());
        assert!(g.node(nodes[3]).is_checkpoint());
        assert!(!g.node(nodes[4]).is_checkpoint());
        assert!(g.node(nodes[5]).is_checkpoint()); // root
    }

    #[test]
    fn test_uniform_interval_one_marks_all_non_leaves() {
        let (mut g, root, nodes) = chain();
        let marked = mark_uniform(&mut g, root, 1);
        assert_eq!(marked, 5);
        assert!(!g.node(nodes[0]).is_checkpoint());
    }

    #[test]
    fn test_adaptive_prefers_expensive_ops() {
        // Two matmuls among cheap ops; sqrt(4) = 2 picks both matmuls.
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[4, 8]), true);
        let w1 = g.leaf(Tensor::ones(&[8, 8]), true);
        let w2 = g.leaf(Tensor::ones(&[8, 2]), true);
        let h1 = g.matmul(x, w1).unwrap();
        let h2 = g.relu(h1).unwrap();
        let h3 = g.matmul(h2, w2).unwrap();
        let root = g.sum(h3).unwrap();

        annotate(&mut g, root);
        let marked = mark_adaptive(&mut g, root);

        assert_eq!(marked, 3); // two matmuls + root
        assert!(g.node(h1).is_checkpoint());
        assert!(g.node(h3).is_checkpoint());
        assert!(g.node(root).is_checkpoint());
        assert!(!g.node(h2).is_checkpoint());
    }

    #[test]
    fn test_budget_every_node_over_budget_marks_all() {
        // 4-element f64 tensors are 32 bytes; budget below that marks
        // every non-leaf node.
        let (mut g, root, nodes) = chain();
        annotate(&mut g, root);
        let marked = mark_budget(&mut g, root, 16);

        assert_eq!(marked, 5);
        for &id in &nodes[1..] {
            assert!(g.node(id).is_checkpoint());
        }
    }

    #[test]
    fn test_budget_large_budget_marks_root_and_first_layer() {
        let (mut g, root, nodes) = chain();
        annotate(&mut g, root);
        let marked = mark_budget(&mut g, root, 1 << 20);

        // Root plus n1 (fed only by the leaf, so it must stay as an
        // anchor); everything between fits in the budget.
        assert_eq!(marked, 2);
        assert!(g.node(root).is_checkpoint());
        assert!(g.node(nodes[1]).is_checkpoint());
        for &id in &nodes[2..5] {
            assert!(!g.node(id).is_checkpoint());
        }
    }

    #[test]
    fn test_policies_never_mark_leaves() {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[2]), true);
        // Single-leaf graph: nothing to mark under any policy.
        assert_eq!(mark_uniform(&mut g, x, 1), 0);
        assert_eq!(mark_adaptive(&mut g, x), 0);
        annotate(&mut g, x);
        assert_eq!(mark_budget(&mut g, x, 1), 0);
        assert!(!g.node(x).is_checkpoint());
    }

    #[test]
    fn test_root_only_op_is_marked() {
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::ones(&[2, 2]), true);
        let w = g.leaf(Tensor::ones(&[2, 2]), true);
        let root = g.matmul(x, w).unwrap();

        annotate(&mut g, root);
        assert_eq!(mark_adaptive(&mut g, root), 1);
        assert!(g.node(root).is_checkpoint());
    }
}
