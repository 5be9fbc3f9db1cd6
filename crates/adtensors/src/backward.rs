//! Reverse-mode backward pass.

use crate::checkpoint::hooks::{ensure_inputs_live, ensure_live};
use crate::error::CheckpointError;
use crate::graph::{Graph, NodeId};
use crate::kernels::add_assign;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Gradients in flight during one backward pass.
///
/// Stored densely, one slot per arena index: the pass touches most of the
/// reachable graph anyway, and slot lookup keeps the hot accumulate/take
/// pair free of hashing. Contributions from multiple downstream paths are
/// added into the slot's buffer in place.
struct GradFlow<T: Scalar> {
    slots: Vec<Option<Tensor<T>>>,
}

impl<T: Scalar> GradFlow<T> {
    fn new(arena_len: usize) -> Self {
        Self {
            slots: (0..arena_len).map(|_| None).collect(),
        }
    }

    fn accumulate(&mut self, id: NodeId, grad: Tensor<T>) {
        let slot = &mut self.slots[id.index()];
        match slot {
            Some(existing) => add_assign(existing, &grad),
            None => *slot = Some(grad),
        }
    }

    fn take(&mut self, id: NodeId) -> Option<Tensor<T>> {
        self.slots[id.index()].take()
    }
}

/// Run reverse-mode differentiation from `root`.
///
/// Seeds a ones gradient at the root, then walks the reachable subgraph in
/// reverse topological order, accumulating into `node.grad` for every node
/// with `requires_grad`. Before a node's VJP reads any tensor, the
/// checkpoint hooks re-materialize whatever the deletion pass released, so
/// the result is identical to a run without checkpointing.
///
/// # Errors
///
/// Propagates recomputation failures (`NoCheckpointReachable`,
/// `UnsupportedOpDuringRecompute`, `ShapeMismatch`,
/// `StochasticOpOnDeletedPath`) and aborts the pass. Node state stays
/// observable but the pass cannot be resumed; discard the graph.
pub fn backward<T: Scalar>(graph: &mut Graph<T>, root: NodeId) -> Result<(), CheckpointError> {
    let order = graph.topological_order(root);

    let mut flow = GradFlow::new(graph.len());
    flow.accumulate(root, Tensor::ones(graph.node(root).shape()));

    for &id in order.iter().rev() {
        let grad = match flow.take(id) {
            Some(g) => g,
            None => continue, // No gradient flowing to this node.
        };

        if graph.node(id).requires_grad() {
            accumulate_node_grad(graph, id, &grad);
        }

        if graph.node(id).is_leaf() {
            continue;
        }

        // Re-materialize anything the VJP needs before touching values.
        ensure_live(graph, id)?;
        ensure_inputs_live(graph, id)?;

        for (input, input_grad) in crate::vjp::vjp(graph, id, &grad)? {
            flow.accumulate(input, input_grad);
        }
    }

    Ok(())
}

fn accumulate_node_grad<T: Scalar>(graph: &mut Graph<T>, id: NodeId, grad: &Tensor<T>) {
    let slot = &mut graph.node_mut(id).grad;
    match slot {
        Some(existing) => add_assign(existing, grad),
        None => *slot = Some(grad.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_backward_chain() {
        // y = sum((x + 1) * 2)  =>  dy/dx = 2
        let mut g: Graph<f64> = Graph::new();
        let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap(), true);
        let a = g.add_scalar(x, 1.0).unwrap();
        let b = g.mul_scalar(a, 2.0).unwrap();
        let root = g.sum(b).unwrap();

        backward(&mut g, root).unwrap();

        let grad = g.node(x).grad().unwrap();
        assert_eq!(grad.data(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_backward_diamond_accumulates() {
        // d = (a*2) + (a+1)  =>  dd/da = 2 + 1 = 3 per element
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[2]), true);
        let b = g.mul_scalar(a, 2.0).unwrap();
        let c = g.add_scalar(a, 1.0).unwrap();
        let d = g.add(b, c).unwrap();
        let root = g.sum(d).unwrap();

        backward(&mut g, root).unwrap();

        assert_eq!(g.node(a).grad().unwrap().data(), &[3.0, 3.0]);
    }

    #[test]
    fn test_backward_reused_input() {
        // y = sum(a * a)  =>  dy/da = 2a
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::from_vec(vec![3.0, -2.0], &[2]).unwrap(), true);
        let sq = g.mul(a, a).unwrap();
        let root = g.sum(sq).unwrap();

        backward(&mut g, root).unwrap();

        assert_eq!(g.node(a).grad().unwrap().data(), &[6.0, -4.0]);
    }

    #[test]
    fn test_backward_matmul() {
        // loss = sum(A @ B): dA = ones @ B^T, dB = A^T @ ones
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[2, 3]), true);
        let b = g.leaf(
            Tensor::from_vec((1..=12).map(|v| v as f64).collect(), &[3, 4]).unwrap(),
            true,
        );
        let c = g.matmul(a, b).unwrap();
        let root = g.sum(c).unwrap();

        backward(&mut g, root).unwrap();

        let grad_a = g.node(a).grad().unwrap();
        assert_eq!(grad_a.shape(), &[2, 3]);
        // grad_A[i,j] = sum over row j of B.
        // B column-major [3,4]: row 0 = {1, 4, 7, 10} -> 22
        assert_relative_eq!(*grad_a.get(&[0, 0]).unwrap(), 22.0, epsilon = 1e-12);
        assert_relative_eq!(*grad_a.get(&[0, 1]).unwrap(), 26.0, epsilon = 1e-12);
        assert_relative_eq!(*grad_a.get(&[0, 2]).unwrap(), 30.0, epsilon = 1e-12);

        let grad_b = g.node(b).grad().unwrap();
        // grad_B[j,k] = sum over column j of A = 2 (A is all ones, 2 rows).
        assert!(grad_b.data().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_backward_no_grad_through_constants() {
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[2]), true);
        let k = g.constant(Tensor::from_vec(vec![5.0, 5.0], &[2]).unwrap());
        let m = g.mul(a, k).unwrap();
        let root = g.sum(m).unwrap();

        backward(&mut g, root).unwrap();

        assert_eq!(g.node(a).grad().unwrap().data(), &[5.0, 5.0]);
        assert!(g.node(k).grad().is_none());
    }

    #[test]
    fn test_backward_twice_accumulates_leaf_grad() {
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[2]), true);
        let root = g.sum(a).unwrap();

        backward(&mut g, root).unwrap();
        backward(&mut g, root).unwrap();

        assert_eq!(g.node(a).grad().unwrap().data(), &[2.0, 2.0]);
    }

    #[test]
    fn test_grad_flow_adds_in_place() {
        let mut g: Graph<f64> = Graph::new();
        let a = g.leaf(Tensor::ones(&[2]), true);

        let mut flow: GradFlow<f64> = GradFlow::new(g.len());
        flow.accumulate(a, Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap());
        flow.accumulate(a, Tensor::from_vec(vec![10.0, 20.0], &[2]).unwrap());

        assert_eq!(flow.take(a).unwrap().data(), &[11.0, 22.0]);
        assert!(flow.take(a).is_none());
    }
}
