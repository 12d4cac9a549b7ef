//! Graphviz export.

use crate::graph::structure::Graph;
use crate::graph::topology::TopologyAnalyzer;
use std::fmt::Write;

/// Render a graph in Graphviz DOT format.
///
/// Nodes appear as `N<i>` labelled with their kernel name. With `show_data`
/// every bound data object becomes a `D<i>` box and edges follow the data
/// (input -> node -> output); otherwise edges link writers to readers.
pub fn to_dot(graph: &Graph, show_data: bool) -> String {
    let mut out = String::from("digraph {\n");

    for node in graph.nodes() {
        let _ = writeln!(
            out,
            "  {} [label=\"{}\\n{}\"];",
            node.id(),
            node.id(),
            node.kernel_name()
        );
    }

    if show_data {
        for object in graph.arena().iter() {
            let label = match object.desc() {
                Some(desc) => desc.to_string(),
                None => "virtual".to_string(),
            };
            let _ = writeln!(
                out,
                "  {} [shape=box label=\"{}\\n{}\"];",
                object.id(),
                object.id(),
                label
            );
        }
        for node in graph.nodes() {
            for (_, data, direction) in node.bindings() {
                if direction.reads() {
                    let _ = writeln!(out, "  {} -> {};", data.id(), node.id());
                }
                if direction.writes() {
                    let _ = writeln!(out, "  {} -> {};", node.id(), data.id());
                }
            }
        }
    } else {
        for (from, to) in TopologyAnalyzer::new(graph).edges() {
            let _ = writeln!(out, "  {} -> {};", from, to);
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::types::ImageFormat;

    fn pipeline() -> Graph {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let c = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.openvx.not", &[a, b]).unwrap();
        graph.add_node("org.khronos.openvx.not", &[b, c]).unwrap();
        graph
    }

    #[test]
    fn test_node_edges() {
        let dot = to_dot(&pipeline(), false);
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.contains("N0 [label=\"N0\\norg.khronos.openvx.not\"];"));
        assert!(dot.contains("N0 -> N1;"));
        assert!(!dot.contains("shape=box"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_data_edges() {
        let dot = to_dot(&pipeline(), true);
        assert!(dot.contains("D1 [shape=box label=\"D1\\nvirtual\"];"));
        assert!(dot.contains("D0 -> N0;"));
        assert!(dot.contains("N0 -> D1;"));
        assert!(dot.contains("D1 -> N1;"));
        assert!(dot.contains("N1 -> D2;"));
        assert!(!dot.contains("N0 -> N1;"));
    }
}
