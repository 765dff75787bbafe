//! Reverse-mode drivers over an expression graph.
//!
//! Both passes order the graph reachable from the output with a DFS postorder
//! and walk it backwards:
//! 1. [`backprop`] is numeric: it seeds the output's bound derivative with ones
//!    and lets every op push derivatives into its inputs' bound values.
//! 2. [`grad`] is symbolic: it builds gradient nodes, summing the
//!    contributions a node receives from each of its consumers.

use ag_tensor::Value;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::expr;
use crate::node::{Group, Node, NodeId};

/// Derivatives read back from the leaves after a numeric pass.
#[derive(Debug)]
pub struct Gradients {
    adjoints: FxHashMap<NodeId, Value>,
    /// Several variables may share a name; each keeps its own entry.
    name_to_grads: FxHashMap<String, Vec<(NodeId, Value)>>,
}

impl Gradients {
    /// Derivative of the output with respect to the variable `node`.
    pub fn wrt(&self, node: &Node) -> Option<&Value> {
        if !node.is_var() {
            return None;
        }
        self.adjoints.get(&node.id())
    }

    /// Derivative for the first variable called `name`.
    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.name_to_grads
            .get(name)
            .and_then(|grads| grads.first().map(|(_, g)| g))
    }

    /// Derivatives for several variables, in order.
    pub fn wrt_many(&self, nodes: &[Node]) -> Vec<Option<&Value>> {
        nodes.iter().map(|n| self.wrt(n)).collect()
    }
}

/// Numeric reverse pass from `output`.
///
/// Every derivative in the graph is reset to zero, the output's derivative is
/// seeded with ones, and each op node pushes its derivative into its inputs.
/// Ops with no differentiable input are skipped.
pub fn backprop(output: &Node) -> Result<Gradients> {
    let _span = tracing::debug_span!("backprop", output = %output).entered();
    let order = topological_sort(output);

    for node in &order {
        node.set_derivative(node.primal()?.zeros_like())?;
    }
    output.set_derivative(output.primal()?.ones_like())?;

    for node in order.iter().rev() {
        let Some(op) = node.op() else {
            continue;
        };
        if !op.differentiable_inputs(node.children().len()).contains(&true) {
            tracing::trace!(node = %node, "skipping non-differentiable op");
            continue;
        }
        op.numeric_differentiate(node.children(), node)?;
    }

    let mut adjoints = FxHashMap::default();
    let mut name_to_grads: FxHashMap<String, Vec<(NodeId, Value)>> = FxHashMap::default();
    for node in order.iter().filter(|n| n.is_var()) {
        let d = node.derivative()?;
        if let Some(name) = node.name() {
            name_to_grads
                .entry(name.to_string())
                .or_default()
                .push((node.id(), d.clone()));
        }
        adjoints.insert(node.id(), d);
    }

    Ok(Gradients {
        adjoints,
        name_to_grads,
    })
}

/// Symbolic gradients of `output` with respect to each node in `wrt`.
///
/// The output's gradient is a constant of ones. A node in `wrt` that the
/// output does not depend on gets a zero constant.
pub fn grad(output: &Node, wrt: &[Node]) -> Result<Vec<Node>> {
    let _span = tracing::debug_span!("grad", output = %output, wrt = wrt.len()).entered();
    let order = topological_sort(output);

    let mut adjoints: FxHashMap<NodeId, Node> = FxHashMap::default();
    adjoints.insert(output.id(), Node::filled_like(output, 1.0));

    for node in order.iter().rev() {
        let Some(op) = node.op() else {
            continue;
        };
        let Some(g) = adjoints.get(&node.id()).cloned() else {
            continue;
        };
        let diffable = op.differentiable_inputs(node.children().len());
        if !diffable.contains(&true) {
            continue;
        }

        let grads = op.symbolic_differentiate(node.children(), node, &g)?;
        for ((child, g), d) in node.children().iter().zip(grads).zip(diffable) {
            if !d {
                continue;
            }
            // chain rule: child's adjoint sums over its consumers
            let total = match adjoints.remove(&child.id()) {
                Some(prev) => {
                    let sum = expr::add(&prev, &g)?;
                    sum.set_group(Group::Gradient);
                    sum
                }
                None => g,
            };
            adjoints.insert(child.id(), total);
        }
    }

    Ok(wrt
        .iter()
        .map(|w| {
            adjoints
                .get(&w.id())
                .cloned()
                .unwrap_or_else(|| Node::filled_like(w, 0.0))
        })
        .collect())
}

/// All nodes reachable from `root`, children before parents.
pub(crate) fn topological_sort(root: &Node) -> Vec<Node> {
    let mut visited = FxHashSet::default();
    let mut order = Vec::new();

    fn dfs(node: &Node, visited: &mut FxHashSet<NodeId>, order: &mut Vec<Node>) {
        if !visited.insert(node.id()) {
            return;
        }
        for child in node.children() {
            dfs(child, visited, order);
        }
        order.push(node.clone());
    }

    dfs(root, &mut visited, &mut order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_tensor::Shape;

    #[test]
    fn test_topological_sort_shared_node() {
        let x = Node::var("x", Value::from(1.0));
        let z = expr::hadamard_prod(&x, &x).unwrap();
        let order = topological_sort(&z);
        assert_eq!(order.len(), 2);
        assert_eq!(order[1].id(), z.id());
    }

    #[test]
    fn test_backprop_product() {
        let x = Node::var("x", Value::from(2.0));
        let y = Node::var("y", Value::from(3.0));
        let z = expr::add(&expr::hadamard_prod(&x, &y).unwrap(), &expr::sin(&x).unwrap()).unwrap();

        let grads = backprop(&z).unwrap();
        let dx = grads.wrt(&x).unwrap().item().unwrap();
        let dy = grads.by_name("y").unwrap().item().unwrap();
        assert!((dx - (3.0 + 2.0f64.cos())).abs() < 1e-12);
        assert!((dy - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_backprop_is_repeatable() {
        let x = Node::var("x", Value::from(3.0));
        let z = expr::hadamard_prod(&x, &x).unwrap();
        backprop(&z).unwrap();
        let grads = backprop(&z).unwrap();
        assert_eq!(grads.wrt(&x), Some(&Value::from(6.0)));
    }

    #[test]
    fn test_backprop_scalar_broadcast_sums() {
        let x = Node::var("x", Value::tensor(vec![1.0, 2.0, 3.0], vec![3]).unwrap());
        let s = Node::var("s", Value::from(2.0));
        let z = expr::sum(&expr::hadamard_prod(&x, &s).unwrap(), &[]).unwrap();
        let grads = backprop(&z).unwrap();
        assert_eq!(grads.wrt(&x).unwrap().to_f64_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(grads.wrt(&s), Some(&Value::from(6.0)));
    }

    #[test]
    fn test_backprop_scalar_shared_by_tensor_ops() {
        let x = Node::var("x", Value::tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap());
        let s = Node::var("s", Value::from(0.5));
        let a = expr::hadamard_prod(&x, &s).unwrap();
        let b = expr::hadamard_prod(&x, &s).unwrap();
        let z = expr::sum(&expr::add(&a, &b).unwrap(), &[]).unwrap();

        let grads = backprop(&z).unwrap();
        assert_eq!(grads.wrt(&s), Some(&Value::from(20.0)));
        assert_eq!(grads.wrt(&x).unwrap().to_f64_vec(), vec![1.0; 4]);

        let g = grad(&z, &[s.clone()]).unwrap();
        assert_eq!(g[0].primal().unwrap(), Value::from(20.0));
    }

    #[test]
    fn test_grad_matches_backprop() {
        let x = Node::var("x", Value::tensor(vec![0.5, -1.0], vec![2]).unwrap());
        let z = expr::sum(&expr::tanh(&expr::square(&x).unwrap()).unwrap(), &[]).unwrap();

        let sym = grad(&z, &[x.clone()]).unwrap();
        assert_eq!(sym[0].shape(), &Shape::new(vec![2]));
        assert_eq!(sym[0].group(), Some(Group::Gradient));
        let numeric = backprop(&z).unwrap();
        let a = sym[0].primal().unwrap().to_f64_vec();
        let b = numeric.wrt(&x).unwrap().to_f64_vec();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-12);
        }
    }

    #[test]
    fn test_grad_shared_input_sums_contributions() {
        let x = Node::var("x", Value::from(3.0));
        let z = expr::hadamard_prod(&x, &x).unwrap();
        let g = grad(&z, &[x.clone()]).unwrap();
        assert_eq!(g[0].primal().unwrap(), Value::from(6.0));
    }

    #[test]
    fn test_grad_unrelated_is_zero() {
        let x = Node::var("x", Value::from(3.0));
        let y = Node::var("y", Value::tensor(vec![1.0, 1.0], vec![2]).unwrap());
        let z = expr::square(&x).unwrap();
        let g = grad(&z, &[y]).unwrap();
        assert_eq!(g[0].primal().unwrap(), Value::tensor(vec![0.0, 0.0], vec![2]).unwrap());
    }

    #[test]
    fn test_comparison_blocks_gradient() {
        let x = Node::var("x", Value::from(3.0));
        let mask = expr::compare(
            crate::catalog::BinaryOpKind::Gt,
            &x,
            &Node::constant(Value::from(1.0)),
            true,
        )
        .unwrap();
        let z = expr::hadamard_prod(&mask, &x).unwrap();
        let grads = backprop(&z).unwrap();
        assert_eq!(grads.wrt(&x), Some(&Value::from(1.0)));
        let g = grad(&z, &[x.clone()]).unwrap();
        assert_eq!(g[0].primal().unwrap(), Value::from(1.0));
    }
}
