//! Deletion pass.
//!
//! Releases the values of unmarked interior nodes after the forward pass,
//! caching the metadata later graph queries need.

use log::{debug, warn};

use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;

use super::footprint::footprint;

/// Outcome of one deletion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteStats {
    /// Nodes whose values were released.
    pub deleted: usize,
    /// Bytes reclaimed.
    pub bytes_freed: u64,
}

/// Release value and saved-tensor storage on every deletable node
/// reachable from `root`.
///
/// Skips leaves, checkpoints, already-deleted nodes, and stochastic-op
/// nodes (their saved masks cannot be regenerated, so deleting them would
/// make gradients irreproducible). Idempotent: a second pass reports zero
/// additional bytes. Never fails: a placement that leaves some deleted
/// node without a live ancestor checkpoint only surfaces later, when the
/// recomputation engine reports it.
pub fn delete_unmarked<T: Scalar>(graph: &mut Graph<T>, root: NodeId) -> DeleteStats {
    let mut stats = DeleteStats::default();

    // Children-before-parents: the topological order already is.
    for id in graph.topological_order(root) {
        let node = graph.node(id);
        if node.is_leaf() || node.is_checkpoint() || node.value_deleted() {
            continue;
        }
        if node.op().is_stochastic() {
            warn!(
                "checkpoint: refusing to delete stochastic node {} ({})",
                id,
                node.op()
            );
            continue;
        }

        let bytes = if node.memory_footprint() > 0 {
            node.memory_footprint()
        } else {
            footprint(node)
        };

        let node = graph.node_mut(id);
        node.cached_shape = node
            .value
            .as_ref()
            .map(|v| v.shape().to_vec())
            .unwrap_or_default();
        node.value = None;
        node.saved.clear();
        node.value_deleted = true;

        debug!("checkpoint: deleted {} ({} bytes)", id, bytes);
        stats.deleted += 1;
        stats.bytes_freed += bytes;
    }

    stats
}
