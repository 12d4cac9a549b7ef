//! Execution plans cached by a successful verification.

use crate::core::error::{DataId, NodeId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifetime and size of one data object within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub data: DataId,
    /// Size of the backing memory in bytes.
    pub bytes: usize,
    /// Position in the order of the first node touching the object.
    pub first_use: usize,
    /// Position in the order of the last node touching the object.
    pub last_use: usize,
}

/// Memory requirements of a plan, one entry per bound object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPlan {
    /// Entries sorted by data id.
    pub entries: Vec<MemoryEntry>,
    /// Sum of all entry sizes.
    pub total_bytes: usize,
    /// Bytes allocated by the verification that built the plan.
    pub allocated_bytes: usize,
}

impl MemoryPlan {
    /// Entry for a data object.
    pub fn entry(&self, data: DataId) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.data == data)
    }
}

/// Everything `process()` needs to run a verified graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Nodes in execution order.
    pub order: Vec<NodeId>,
    /// Dependency levels; nodes in a level are independent of each other.
    pub levels: Vec<Vec<NodeId>>,
    /// Target index assigned to each node.
    pub targets: IndexMap<NodeId, usize>,
    /// Bytes each node reads and writes per run.
    pub bandwidth: IndexMap<NodeId, usize>,
    pub memory: MemoryPlan,
}

impl ExecutionPlan {
    /// Position of a node in the execution order.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == node)
    }

    /// Target index assigned to a node.
    pub fn target(&self, node: NodeId) -> Option<usize> {
        self.targets.get(&node).copied()
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lookups() {
        let mut plan = ExecutionPlan {
            order: vec![NodeId(1), NodeId(0)],
            levels: vec![vec![NodeId(1)], vec![NodeId(0)]],
            ..Default::default()
        };
        plan.targets.insert(NodeId(1), 0);
        plan.memory.entries.push(MemoryEntry {
            data: DataId(3),
            bytes: 16,
            first_use: 0,
            last_use: 1,
        });

        assert_eq!(plan.position(NodeId(0)), Some(1));
        assert_eq!(plan.position(NodeId(7)), None);
        assert_eq!(plan.target(NodeId(1)), Some(0));
        assert_eq!(plan.memory.entry(DataId(3)).unwrap().bytes, 16);
        assert_eq!(plan.node_count(), 2);
        assert!(!plan.is_empty());
    }
}
