//! Gradient checkpointing core.
//!
//! Trades recomputation for memory: a placement policy marks a subset of
//! graph nodes as checkpoints, the deletion pass releases every other
//! interior activation after the forward pass, and the recomputation
//! engine transparently re-materializes released values when the backward
//! pass needs them.
//!
//! One training step:
//!
//! ```text
//! forward build ──► analyze_and_mark ──► delete_unmarked ──► backward
//!                        (policy)            (release)          │
//!                                                               ▼
//!                                             ensure_live / ensure_inputs_live
//!                                                               │
//!                                                               ▼
//!                                                    recompute (replay from
//!                                                     nearest live anchor)
//! ```
//!
//! Invariants upheld throughout:
//!
//! - checkpoints and leaves are never deleted;
//! - `Node::shape()` answers correctly before deletion, after deletion,
//!   and after recomputation;
//! - a recomputed value is element-wise identical to the original forward
//!   value (same dispatch, same inputs);
//! - gradients with checkpointing equal gradients without it.

pub mod cost;
pub mod delete;
pub mod footprint;
pub mod hooks;
pub mod manager;
pub mod policy;
pub mod recompute;

pub use cost::should_checkpoint;
pub use delete::{DeleteStats, delete_unmarked};
pub use footprint::{annotate, footprint};
pub use hooks::{ensure_inputs_live, ensure_live, zero_grad};
pub use manager::{CheckpointManager, CheckpointStats, Policy};
pub use policy::{mark_adaptive, mark_budget, mark_uniform};
pub use recompute::recompute;
