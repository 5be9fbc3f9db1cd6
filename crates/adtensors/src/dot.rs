//! Graphviz export of the computation graph.

use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::graph::{Graph, NodeId};
use crate::scalar::Scalar;

fn label<T: Scalar>(graph: &Graph<T>, id: NodeId) -> String {
    let node = graph.node(id);
    let mut label = match node.name() {
        Some(name) => format!("{id} {name}"),
        None => format!("{id} {}", node.op()),
    };
    if node.is_checkpoint() {
        label.push_str(" [ckpt]");
    }
    if node.value_deleted() {
        label.push_str(" [deleted]");
    }
    label
}

/// Render the subgraph reachable from `root` as Graphviz DOT.
///
/// Edges point from inputs to consumers. Checkpointed nodes carry a
/// `[ckpt]` suffix, deleted ones `[deleted]`.
///
/// # Example
///
/// ```
/// use adtensors::{Graph, Tensor, dot::to_dot};
///
/// let mut g: Graph<f64> = Graph::new();
/// let x = g.leaf_named(Tensor::ones(&[2]), true, "x");
/// let y = g.exp(x).unwrap();
/// let rendered = to_dot(&g, y);
/// assert!(rendered.contains("n0 x"));
/// assert!(rendered.contains("n1 exp"));
/// ```
pub fn to_dot<T: Scalar>(graph: &Graph<T>, root: NodeId) -> String {
    let order = graph.topological_order(root);

    let mut dg: DiGraph<String, ()> = DiGraph::new();
    let mut index = HashMap::new();
    for &id in &order {
        index.insert(id, dg.add_node(label(graph, id)));
    }
    for &id in &order {
        for &input in graph.node(id).inputs() {
            dg.add_edge(index[&input], index[&id], ());
        }
    }

    format!("{:?}", Dot::with_config(&dg, &[Config::EdgeNoLabel]))
}

/// Write the DOT rendering of the graph to a file.
pub fn dump_dot<T: Scalar>(
    graph: &Graph<T>,
    root: NodeId,
    path: impl AsRef<Path>,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(to_dot(graph, root).as_bytes())
}
