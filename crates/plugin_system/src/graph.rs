//! Load-order computation over hard and soft plugin dependencies.
//!
//! Nodes are kept in declaration order. An edge `a -> b` means `a` must load
//! before `b`. Cycles are reported as strongly connected components; the
//! topological sort assumes they have already been removed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One plugin in the graph.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub name: String,
    /// Plugins that must load before this one.
    pub after: Vec<String>,
}

struct Graph<'a> {
    nodes: &'a [Node],
    /// successors[i] = nodes that depend on node i
    successors: Vec<Vec<usize>>,
}

impl<'a> Graph<'a> {
    /// Builds adjacency, ignoring edges to names that are not nodes.
    fn new(nodes: &'a [Node]) -> Self {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut successors = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.after {
                if let Some(&d) = index.get(dep.as_str()) {
                    if !successors[d].contains(&i) {
                        successors[d].push(i);
                    }
                }
            }
        }
        Self { nodes, successors }
    }
}

/// Returns every group of plugins that depend on each other in a cycle,
/// including plugins that list themselves.
pub(crate) fn find_cycles(nodes: &[Node]) -> Vec<Vec<String>> {
    let graph = Graph::new(nodes);
    let mut tarjan = Tarjan {
        graph: &graph,
        index: 0,
        indices: vec![None; nodes.len()],
        lowlink: vec![0; nodes.len()],
        on_stack: vec![false; nodes.len()],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for v in 0..nodes.len() {
        if tarjan.indices[v].is_none() {
            tarjan.connect(v);
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || graph.successors[c[0]].contains(&c[0]))
        .map(|mut c| {
            c.sort_unstable();
            c.into_iter().map(|i| nodes[i].name.clone()).collect()
        })
        .collect();
    cycles.sort();
    cycles
}

struct Tarjan<'g, 'a> {
    graph: &'g Graph<'a>,
    index: usize,
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_, '_> {
    fn connect(&mut self, v: usize) {
        self.indices[v] = Some(self.index);
        self.lowlink[v] = self.index;
        self.index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let graph = self.graph;
        for &w in &graph.successors[v] {
            match self.indices[w] {
                None => {
                    self.connect(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[v]) == self.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Kahn's algorithm; ties are broken by declaration order.
///
/// Nodes left over because of a cycle are omitted.
pub(crate) fn load_order(nodes: &[Node]) -> Vec<String> {
    let graph = Graph::new(nodes);
    let mut in_degree = vec![0usize; nodes.len()];
    for succ in &graph.successors {
        for &s in succ {
            in_degree[s] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(graph.nodes[i].name.clone());
        for &s in &graph.successors[i] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.push(Reverse(s));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, after: &[&str]) -> Node {
        Node {
            name: name.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_declaration_order_without_edges() {
        let nodes = vec![node("c", &[]), node("a", &[]), node("b", &[])];
        assert_eq!(load_order(&nodes), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_load_first() {
        let nodes = vec![node("a", &["b"]), node("b", &[]), node("c", &["a"])];
        assert_eq!(load_order(&nodes), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_edges_to_absent_nodes_are_ignored() {
        let nodes = vec![node("a", &["ghost"]), node("b", &[])];
        assert_eq!(load_order(&nodes), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_detection() {
        let nodes = vec![
            node("a", &["b"]),
            node("b", &["a"]),
            node("c", &[]),
            node("d", &["d"]),
            node("e", &["c"]),
        ];
        assert_eq!(
            find_cycles(&nodes),
            vec![vec!["a".to_string(), "b".to_string()], vec!["d".to_string()]]
        );
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])];
        assert!(find_cycles(&nodes).is_empty());
        assert_eq!(load_order(&nodes), vec!["a", "b", "c"]);
    }
}
