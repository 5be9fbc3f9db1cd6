//! Checkpoint manager.
//!
//! Orchestrates placement, deletion, and statistics for one training step.
//! Owned object, scoped to the graphs it is handed; there is no global
//! manager.

use log::{info, warn};

use crate::error::CheckpointError;
use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;

use super::delete;
use super::footprint;
use super::policy;

/// Placement strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// No automatic placement; the user marks nodes via
    /// [`Graph::checkpoint`].
    #[default]
    Manual,
    /// Every k-th node of the topological order.
    Uniform,
    /// ~sqrt(N) checkpoints, expensive ops first.
    Adaptive,
    /// Bound live interior bytes between checkpoints.
    Budget,
}

/// Counters reported by [`CheckpointManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    pub marked_count: usize,
    pub deleted_count: usize,
    pub bytes_freed: u64,
    pub recompute_count: u64,
}

/// User-facing orchestration over the checkpoint core.
///
/// # Example
///
/// ```
/// use adtensors::{CheckpointManager, Graph, Policy, Tensor, backward};
///
/// let mut g: Graph<f64> = Graph::new();
/// let x = g.leaf(Tensor::ones(&[4, 4]), true);
/// let h = g.exp(x).unwrap();
/// let r = g.tanh(h).unwrap();
/// let root = g.sum(r).unwrap();
///
/// let mut manager = CheckpointManager::with_policy(Policy::Adaptive);
/// manager.analyze_and_mark(&mut g, root);
/// manager.delete_unmarked(&mut g, root);
/// backward(&mut g, root).unwrap();
///
/// let stats = manager.stats(&g);
/// assert!(stats.marked_count > 0);
/// ```
#[derive(Debug)]
pub struct CheckpointManager {
    policy: Policy,
    interval: usize,
    budget_bytes: u64,
    verbose: bool,
    save_rng: bool,
    marked_count: usize,
    deleted_count: usize,
    bytes_freed: u64,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointManager {
    /// Create a manager in Manual mode.
    pub fn new() -> Self {
        Self {
            policy: Policy::Manual,
            interval: 2,
            budget_bytes: 0,
            verbose: false,
            save_rng: false,
            marked_count: 0,
            deleted_count: 0,
            bytes_freed: 0,
        }
    }

    /// Create a manager with the given placement policy.
    pub fn with_policy(policy: Policy) -> Self {
        Self {
            policy,
            ..Self::new()
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Whether RNG state capture is enabled (currently always `false`).
    pub fn save_rng(&self) -> bool {
        self.save_rng
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    /// Set the Uniform interval (every k-th node becomes a checkpoint).
    pub fn set_interval(&mut self, interval: usize) -> Result<(), CheckpointError> {
        if interval == 0 {
            return Err(CheckpointError::ConfigInvalid(
                "interval must be positive".into(),
            ));
        }
        self.interval = interval;
        Ok(())
    }

    /// Set the Budget byte bound on live intermediate state.
    pub fn set_budget(&mut self, budget_bytes: u64) -> Result<(), CheckpointError> {
        if budget_bytes == 0 {
            return Err(CheckpointError::ConfigInvalid(
                "budget must be positive".into(),
            ));
        }
        self.budget_bytes = budget_bytes;
        Ok(())
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Reserved for stochastic-op replay; only `false` is accepted.
    pub fn set_save_rng(&mut self, save_rng: bool) -> Result<(), CheckpointError> {
        if save_rng {
            return Err(CheckpointError::ConfigInvalid(
                "save_rng is not supported; stochastic nodes are kept resident instead".into(),
            ));
        }
        self.save_rng = false;
        Ok(())
    }

    /// Run the footprint annotation pass and the configured placement
    /// strategy. Returns how many nodes were newly marked.
    ///
    /// Manual policy annotates but marks nothing.
    pub fn analyze_and_mark<T: Scalar>(&mut self, graph: &mut Graph<T>, root: NodeId) -> usize {
        footprint::annotate(graph, root);

        let marked = match self.policy {
            Policy::Manual => 0,
            Policy::Uniform => policy::mark_uniform(graph, root, self.interval),
            Policy::Adaptive => policy::mark_adaptive(graph, root),
            Policy::Budget => {
                if self.budget_bytes == 0 {
                    warn!("checkpoint: budget unset, marking every non-leaf node");
                }
                policy::mark_budget(graph, root, self.budget_bytes)
            }
        };

        if self.verbose {
            info!("checkpoint: marked {marked} node(s) with {:?} policy", self.policy);
        }
        self.marked_count += marked;
        marked
    }

    /// Release unmarked interior values. Returns bytes freed.
    pub fn delete_unmarked<T: Scalar>(&mut self, graph: &mut Graph<T>, root: NodeId) -> u64 {
        let stats = delete::delete_unmarked(graph, root);
        if self.verbose {
            info!(
                "checkpoint: deleted {} node(s), freed {} bytes",
                stats.deleted, stats.bytes_freed
            );
        }
        self.deleted_count += stats.deleted;
        self.bytes_freed += stats.bytes_freed;
        stats.bytes_freed
    }

    /// Snapshot of the counters, merged with the graph's recompute count.
    pub fn stats<T: Scalar>(&self, graph: &Graph<T>) -> CheckpointStats {
        CheckpointStats {
            marked_count: self.marked_count,
            deleted_count: self.deleted_count,
            bytes_freed: self.bytes_freed,
            recompute_count: graph.recompute_count(),
        }
    }

    /// Reset the manager's counters (for reuse across training steps).
    pub fn reset_stats(&mut self) {
        self.marked_count = 0;
        self.deleted_count = 0;
        self.bytes_freed = 0;
    }
}
