//! Footprint accountant.
//!
//! Answers "how many bytes does deleting this node reclaim" and caches the
//! answer on the node for the placement policies.

use crate::graph::{Graph, Node, NodeId};
use crate::scalar::Scalar;

use super::cost::should_checkpoint;

/// Bytes reclaimable by releasing this node's value and saved tensors.
///
/// Leaves and already-deleted nodes report 0: neither has anything the
/// deletion pass may take.
pub fn footprint<T: Scalar>(node: &Node<T>) -> u64 {
    if node.is_leaf() || node.value_deleted() {
        return 0;
    }
    let value_bytes = node.value().map_or(0, |v| v.byte_size());
    let saved_bytes: u64 = node.saved().iter().map(|t| t.byte_size()).sum();
    value_bytes + saved_bytes
}

/// Cache footprints and default placement priorities on every node
/// reachable from `root`.
///
/// `memory_footprint` feeds the Budget policy and the deletion pass's byte
/// accounting. `recompute_priority` is set to 1 for expensive ops and 0
/// otherwise; `Graph::set_recompute_priority` overrides must come after
/// this pass.
pub fn annotate<T: Scalar>(graph: &mut Graph<T>, root: NodeId) {
    for id in graph.topological_order(root) {
        let (bytes, priority) = {
            let node = graph.node(id);
            let priority = if should_checkpoint(node.op()) { 1 } else { 0 };
            (footprint(node), priority)
        };
        let node = graph.node_mut(id);
        node.memory_footprint = bytes;
        node.recompute_priority = priority;
    }
}
