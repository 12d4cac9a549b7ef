//! Dependency analysis and ordering of graphs.
//!
//! Provides algorithms for:
//! - Single-writer checking
//! - Topological sorting (execution order)
//! - Dependency levels for parallel execution
//! - Cycle member identification

use crate::core::error::{NodeId, VerifyError, VerifyResult};
use crate::graph::structure::Graph;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Analyzer for graph dependencies.
///
/// A node depends on every node that writes an object it reads.
pub struct TopologyAnalyzer<'a> {
    graph: &'a Graph,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    /// Fail if any data object has more than one writer.
    ///
    /// Objects are checked in id order so the reported object is stable.
    pub fn check_single_writer(&self) -> VerifyResult<()> {
        match self
            .graph
            .producers()
            .iter()
            .find(|(_, writers)| writers.len() > 1)
        {
            Some((&data, writers)) => Err(VerifyError::MultipleWriters {
                data,
                writers: writers.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Dependency edges `(writer, reader)`, sorted and deduplicated.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges = BTreeSet::new();
        for node in self.graph.nodes() {
            for data in node.reads() {
                for &writer in self.graph.writers(data) {
                    if writer != node.id() {
                        edges.insert((writer, node.id()));
                    }
                }
            }
        }
        edges.into_iter().collect()
    }

    /// Get the execution order (Kahn's algorithm).
    ///
    /// Among ready nodes the one inserted first runs first, so the order is
    /// deterministic.
    pub fn topological_sort(&self) -> VerifyResult<Vec<NodeId>> {
        let edges = self.edges();
        let mut in_degree: HashMap<NodeId, usize> =
            self.graph.node_ids().map(|id| (id, 0)).collect();
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &(from, to) in &edges {
            adjacency.entry(from).or_default().push(to);
            *in_degree.entry(to).or_default() += 1;
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for next in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*next));
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(VerifyError::CyclicGraph {
                nodes: self.cycle_members(&edges),
            });
        }
        Ok(order)
    }

    /// Whether the dependency graph contains a cycle.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Group an execution order into dependency levels.
    ///
    /// A node's level is one more than the deepest node it depends on;
    /// within a level nodes keep their position in `order`.
    pub fn levels(&self, order: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to) in self.edges() {
            predecessors.entry(to).or_default().push(from);
        }

        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        for &node in order {
            let d = predecessors
                .get(&node)
                .into_iter()
                .flatten()
                .filter_map(|p| depth.get(p))
                .max()
                .map_or(0, |deepest| deepest + 1);
            depth.insert(node, d);
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(node);
        }
        levels
    }

    /// Nodes on some cycle, from the non-trivial strongly connected components.
    fn cycle_members(&self, edges: &[(NodeId, NodeId)]) -> Vec<NodeId> {
        let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for id in self.graph.node_ids() {
            graph.add_node(id);
        }
        for &(from, to) in edges {
            graph.add_edge(from, to, ());
        }

        let mut members: Vec<NodeId> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .collect();
        members.sort();
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::types::ImageFormat;

    fn graph() -> Graph {
        Graph::new(Context::new_shared())
    }

    #[test]
    fn test_sort_follows_data_not_insertion() {
        let mut graph = graph();
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let c = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let second = graph.add_node("org.khronos.copy_image", &[b, c]).unwrap();
        let first = graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        assert_eq!(analyzer.edges(), vec![(first, second)]);
        assert_eq!(analyzer.topological_sort().unwrap(), vec![first, second]);
        assert_eq!(
            analyzer.levels(&[first, second]),
            vec![vec![first], vec![second]]
        );
    }

    #[test]
    fn test_independent_nodes_share_a_level() {
        let mut graph = graph();
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let c = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let n0 = graph.add_node("org.khronos.openvx.not", &[a, b]).unwrap();
        let n1 = graph.add_node("org.khronos.openvx.not", &[a, c]).unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        let order = analyzer.topological_sort().unwrap();
        assert_eq!(order, vec![n0, n1]);
        assert_eq!(analyzer.levels(&order), vec![vec![n0, n1]]);
    }

    #[test]
    fn test_cycle_members() {
        let mut graph = graph();
        let x = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let y = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let z = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let a = graph.add_node("org.khronos.copy_image", &[y, x]).unwrap();
        let b = graph.add_node("org.khronos.copy_image", &[x, y]).unwrap();
        graph.add_node("org.khronos.copy_image", &[x, z]).unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        assert!(analyzer.has_cycle());
        assert_eq!(
            analyzer.topological_sort(),
            Err(VerifyError::CyclicGraph { nodes: vec![a, b] })
        );
    }

    #[test]
    fn test_multiple_writers() {
        let mut graph = graph();
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let out = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let n0 = graph.add_node("org.khronos.copy_image", &[a, out]).unwrap();
        let n1 = graph.add_node("org.khronos.openvx.not", &[a, out]).unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        assert_eq!(
            analyzer.check_single_writer(),
            Err(VerifyError::MultipleWriters {
                data: out.id(),
                writers: vec![n0, n1],
            })
        );
    }
}
