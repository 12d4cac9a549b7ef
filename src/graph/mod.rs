//! Graph module for building and running kernel graphs.
//!
//! A graph is a directed acyclic graph (DAG) where nodes are kernel
//! instances and edges are implied by the data objects they share: a node
//! that reads an object depends on the node that writes it.

pub mod dot;
pub mod node;
pub mod structure;
pub mod topology;

// Re-export commonly used types
pub use dot::to_dot;
pub use node::{Node, NodeAction, NodeCallback};
pub use structure::Graph;
pub use topology::TopologyAnalyzer;
