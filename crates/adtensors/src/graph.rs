//! Dynamic computation graph.
//!
//! The graph is an arena: nodes live in a `Vec`, handles are [`NodeId`]
//! indices. Builder methods evaluate eagerly, so after construction every
//! node holds its forward value. Parent→input edges are ids into the same
//! arena. There are no owning back-references, which is what lets the
//! deletion pass drop a value without disturbing graph structure and lets
//! the recomputation engine re-walk the original DAG.

use rand::Rng;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;

use crate::error::TensorError;
use crate::eval::{EvalOutput, forward_eval};
use crate::op::Op;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Unique identifier for a node in the computation graph.
///
/// Ids are assigned in creation order. Since an op node can only reference
/// inputs that already exist, ascending id order is a topological order of
/// the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A node in the computation graph.
///
/// Carries the forward metadata (op tag, input edges, value, saved
/// tensors), the reverse-mode accumulator, and the per-node checkpoint
/// annotations.
#[derive(Debug)]
pub struct Node<T: Scalar> {
    id: NodeId,
    op: Op,
    inputs: SmallVec<[NodeId; 2]>,
    name: Option<String>,
    pub(crate) value: Option<Tensor<T>>,
    pub(crate) saved: Vec<Tensor<T>>,
    requires_grad: bool,
    pub(crate) grad: Option<Tensor<T>>,

    pub(crate) is_checkpoint: bool,
    pub(crate) value_deleted: bool,
    pub(crate) cached_shape: Vec<usize>,
    pub(crate) memory_footprint: u64,
    pub(crate) recompute_priority: i64,
}

impl<T: Scalar> Node<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Optional user label (set on named leaves).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Materialized forward value, `None` after deletion.
    pub fn value(&self) -> Option<&Tensor<T>> {
        self.value.as_ref()
    }

    /// Whether a non-empty value is materialized.
    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Tensors stashed by the forward op for its VJP.
    pub fn saved(&self) -> &[Tensor<T>] {
        &self.saved
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Accumulated gradient, if any.
    pub fn grad(&self) -> Option<&Tensor<T>> {
        self.grad.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn is_checkpoint(&self) -> bool {
        self.is_checkpoint
    }

    pub fn value_deleted(&self) -> bool {
        self.value_deleted
    }

    /// Shape captured at deletion time (empty before any deletion).
    pub fn cached_shape(&self) -> &[usize] {
        &self.cached_shape
    }

    /// Cached byte footprint (set by the annotation pass).
    pub fn memory_footprint(&self) -> u64 {
        self.memory_footprint
    }

    /// Placement hint; lower means prefer to drop.
    pub fn recompute_priority(&self) -> i64 {
        self.recompute_priority
    }

    /// Current tensor shape.
    ///
    /// Answers correctly whether or not the value has been deleted: once
    /// the value is gone, the shape cached at deletion time is returned.
    pub fn shape(&self) -> &[usize] {
        match &self.value {
            Some(v) => v.shape(),
            None => &self.cached_shape,
        }
    }
}

/// Dynamic computation graph with eager forward evaluation.
///
/// # Example
///
/// ```
/// use adtensors::{Graph, Tensor};
///
/// let mut g: Graph<f64> = Graph::new();
/// let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap(), true);
/// let y = g.add_scalar(x, 1.0).unwrap();
/// let z = g.sum(y).unwrap();
/// assert_eq!(g.node(z).value().unwrap().data(), &[5.0]);
/// ```
pub struct Graph<T: Scalar> {
    nodes: Vec<Node<T>>,
    recompute_count: u64,
}

impl<T: Scalar> Graph<T> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            recompute_count: 0,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id.index())
    }

    /// Get node by ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.index()]
    }

    /// Iterate over all nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<T>> {
        self.nodes.iter()
    }

    /// How many times the recomputation engine has replayed forward ops on
    /// this graph.
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    pub(crate) fn bump_recompute_count(&mut self) {
        self.recompute_count += 1;
    }

    fn push(
        &mut self,
        op: Op,
        inputs: SmallVec<[NodeId; 2]>,
        name: Option<String>,
        value: Tensor<T>,
        saved: Vec<Tensor<T>>,
        requires_grad: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            op,
            inputs,
            name,
            value: Some(value),
            saved,
            requires_grad,
            grad: None,
            is_checkpoint: false,
            value_deleted: false,
            cached_shape: Vec::new(),
            memory_footprint: 0,
            recompute_priority: 0,
        });
        id
    }

    /// Create a leaf node holding a user-supplied tensor.
    pub fn leaf(&mut self, value: Tensor<T>, requires_grad: bool) -> NodeId {
        self.push(Op::Leaf, SmallVec::new(), None, value, Vec::new(), requires_grad)
    }

    /// Create a named leaf node.
    ///
    /// The name shows up in DOT output and diagnostics.
    pub fn leaf_named(
        &mut self,
        value: Tensor<T>,
        requires_grad: bool,
        name: impl Into<String>,
    ) -> NodeId {
        self.push(
            Op::Leaf,
            SmallVec::new(),
            Some(name.into()),
            value,
            Vec::new(),
            requires_grad,
        )
    }

    /// Create a constant leaf (no gradient).
    pub fn constant(&mut self, value: Tensor<T>) -> NodeId {
        self.leaf(value, false)
    }

    fn check_id(&self, id: NodeId) -> Result<(), TensorError> {
        if id.index() >= self.nodes.len() {
            return Err(TensorError::InvalidOperation(format!(
                "node {id} does not belong to this graph"
            )));
        }
        Ok(())
    }

    fn value_ref(&self, id: NodeId) -> Result<&Tensor<T>, TensorError> {
        self.check_id(id)?;
        self.nodes[id.index()]
            .value
            .as_ref()
            .ok_or_else(|| TensorError::InvalidOperation(format!("node {id} has no live value")))
    }

    fn propagated_requires_grad(&self, inputs: &[NodeId]) -> bool {
        inputs
            .iter()
            .any(|&id| self.nodes[id.index()].requires_grad)
    }

    /// Apply a forward op to existing nodes, evaluating eagerly.
    ///
    /// This is the generic entry; the named builder methods below are
    /// sugar over it.
    pub fn apply(&mut self, op: Op, inputs: &[NodeId]) -> Result<NodeId, TensorError> {
        let mut vals = Vec::with_capacity(inputs.len());
        for &id in inputs {
            vals.push(self.value_ref(id)?);
        }
        let EvalOutput { value, saved } = forward_eval(op, &vals)?;
        let requires_grad = self.propagated_requires_grad(inputs);
        Ok(self.push(
            op,
            SmallVec::from_slice(inputs),
            None,
            value,
            saved,
            requires_grad,
        ))
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Add, &[a, b])
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Sub, &[a, b])
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Mul, &[a, b])
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Div, &[a, b])
    }

    pub fn neg(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Neg, &[a])
    }

    pub fn add_scalar(&mut self, a: NodeId, c: f64) -> Result<NodeId, TensorError> {
        self.apply(Op::AddScalar { c }, &[a])
    }

    pub fn mul_scalar(&mut self, a: NodeId, c: f64) -> Result<NodeId, TensorError> {
        self.apply(Op::MulScalar { c }, &[a])
    }

    pub fn relu(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Relu, &[a])
    }

    pub fn leaky_relu(&mut self, a: NodeId, alpha: f64) -> Result<NodeId, TensorError> {
        self.apply(Op::LeakyRelu { alpha }, &[a])
    }

    pub fn tanh(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Tanh, &[a])
    }

    pub fn sigmoid(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Sigmoid, &[a])
    }

    pub fn softplus(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Softplus, &[a])
    }

    pub fn silu(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Silu, &[a])
    }

    pub fn exp(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Exp, &[a])
    }

    pub fn log(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Log, &[a])
    }

    pub fn matmul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::MatMul, &[a, b])
    }

    pub fn transpose(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Transpose, &[a])
    }

    pub fn sum(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Sum, &[a])
    }

    pub fn mean(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Mean, &[a])
    }

    pub fn softmax(&mut self, a: NodeId) -> Result<NodeId, TensorError> {
        self.apply(Op::Softmax, &[a])
    }

    pub fn layer_norm(&mut self, a: NodeId, eps: f64) -> Result<NodeId, TensorError> {
        self.apply(Op::LayerNorm { eps }, &[a])
    }

    pub fn rms_norm(&mut self, a: NodeId, eps: f64) -> Result<NodeId, TensorError> {
        self.apply(Op::RmsNorm { eps }, &[a])
    }

    /// Element dropout with drop probability `p`.
    ///
    /// The forward pass draws a keep mask scaled by `1/(1-p)` and stashes
    /// it as a saved tensor; the VJP multiplies by the same mask. The op is
    /// stochastic, so the deletion pass will never release this node.
    pub fn dropout(&mut self, a: NodeId, p: f64) -> Result<NodeId, TensorError> {
        if !(0.0..1.0).contains(&p) {
            return Err(TensorError::InvalidOperation(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }

        let (value, mask) = {
            let x = self.value_ref(a)?;
            let keep = T::from_f64(1.0 / (1.0 - p));
            let mut rng = rand::rng();
            let mut mask = Tensor::<T>::zeros(x.shape());
            for m in mask.data_mut() {
                if rng.random_bool(1.0 - p) {
                    *m = keep;
                }
            }
            let value = crate::kernels::zip_map("dropout", x, &mask, |v, m| v * m)?;
            (value, mask)
        };

        let requires_grad = self.propagated_requires_grad(&[a]);
        Ok(self.push(
            Op::Dropout { p },
            SmallVec::from_slice(&[a]),
            None,
            value,
            vec![mask],
            requires_grad,
        ))
    }

    /// Register a node whose value was computed outside the dispatch table.
    ///
    /// The node participates in graph queries and deletion, but the
    /// recomputation engine cannot replay it: if it ends up deleted on a
    /// replay path, the backward pass fails with
    /// `UnsupportedOpDuringRecompute` naming `name`.
    pub fn custom(
        &mut self,
        name: &'static str,
        inputs: &[NodeId],
        value: Tensor<T>,
    ) -> Result<NodeId, TensorError> {
        for &id in inputs {
            self.check_id(id)?;
        }
        let requires_grad = self.propagated_requires_grad(inputs);
        Ok(self.push(
            Op::Custom(name),
            SmallVec::from_slice(inputs),
            None,
            value,
            Vec::new(),
            requires_grad,
        ))
    }

    /// Mark a node as a checkpoint and hand the same id back.
    ///
    /// Checkpointed nodes retain their value through the backward pass and
    /// serve as replay anchors for their descendants.
    pub fn checkpoint(&mut self, id: NodeId) -> NodeId {
        self.nodes[id.index()].is_checkpoint = true;
        id
    }

    /// Override the placement hint for a node (lower = prefer to drop).
    pub fn set_recompute_priority(&mut self, id: NodeId, priority: i64) {
        self.nodes[id.index()].recompute_priority = priority;
    }

    /// Nodes reachable from `root` through input edges, in topological
    /// order (inputs before consumers, root last).
    ///
    /// Ids are assigned in creation order, which is already topological, so
    /// this is the ascending-id restriction to the reachable set: cheap
    /// and deterministic.
    pub fn topological_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut reachable = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            for &input in self.nodes[id.index()].inputs() {
                if !reachable.contains(&input) {
                    stack.push(input);
                }
            }
        }
        let mut order: Vec<NodeId> = reachable.into_iter().collect();
        order.sort_unstable();
        order
    }
}

impl<T: Scalar> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("num_nodes", &self.nodes.len())
            .field("recompute_count", &self.recompute_count)
            .finish()
    }
}
