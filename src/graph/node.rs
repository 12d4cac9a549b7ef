//! Nodes: a kernel bound to an ordered list of data objects.

use crate::core::data::DataRef;
use crate::core::error::{DataId, NodeId};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::Direction;
use crate::execution::perf::Perf;
use crate::kernels::registry::RegisteredKernel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What the graph should do after a node completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeAction {
    /// Keep executing.
    #[default]
    Continue,
    /// Stop processing; the graph fails with `Abandoned`.
    Abandon,
}

/// Completion callback attached to a node.
pub type NodeCallback = Arc<dyn Fn(NodeId) -> NodeAction + Send + Sync>;

/// A node instance in a graph.
pub struct Node {
    id: NodeId,
    kernel: RegisteredKernel,
    refs: Vec<DataRef>,
    /// Explicit target index, overriding the assignment policy.
    affinity: Option<usize>,
    callback: Option<NodeCallback>,
    perf: Mutex<Perf>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kernel: RegisteredKernel, refs: Vec<DataRef>) -> Self {
        Self {
            id,
            kernel,
            refs,
            affinity: None,
            callback: None,
            perf: Mutex::new(Perf::new()),
        }
    }

    /// Id of this node within its graph.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The bound kernel.
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.kernel.as_ref()
    }

    /// Registry entry of the bound kernel.
    pub fn registered_kernel(&self) -> &RegisteredKernel {
        &self.kernel
    }

    /// Dotted name of the bound kernel.
    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    /// Parameter signature of the bound kernel.
    pub fn metadata(&self) -> &KernelMetadata {
        &self.kernel.metadata
    }

    pub(crate) fn metadata_arc(&self) -> &Arc<KernelMetadata> {
        &self.kernel.metadata
    }

    /// Bound data objects, one per parameter slot.
    pub fn refs(&self) -> &[DataRef] {
        &self.refs
    }

    /// Every binding with the direction of its slot.
    pub fn bindings(&self) -> impl Iterator<Item = (usize, DataRef, Direction)> + '_ {
        self.refs
            .iter()
            .zip(&self.kernel.metadata.parameters)
            .enumerate()
            .map(|(i, (r, p))| (i, *r, p.direction))
    }

    /// Ids of the objects this node reads.
    pub fn reads(&self) -> impl Iterator<Item = DataId> + '_ {
        self.bindings()
            .filter(|(_, _, d)| d.reads())
            .map(|(_, r, _)| r.id())
    }

    /// Ids of the objects this node writes.
    pub fn writes(&self) -> impl Iterator<Item = DataId> + '_ {
        self.bindings()
            .filter(|(_, _, d)| d.writes())
            .map(|(_, r, _)| r.id())
    }

    /// Explicit target index, if one was assigned.
    pub fn affinity(&self) -> Option<usize> {
        self.affinity
    }

    pub(crate) fn set_affinity(&mut self, target: Option<usize>) {
        self.affinity = target;
    }

    /// Completion callback, if one was set.
    pub fn callback(&self) -> Option<&NodeCallback> {
        self.callback.as_ref()
    }

    pub(crate) fn set_callback(&mut self, callback: Option<NodeCallback>) {
        self.callback = callback;
    }

    /// Snapshot of this node's performance counters.
    pub fn perf(&self) -> Perf {
        *self.perf.lock()
    }

    pub(crate) fn record(&self, elapsed: Duration) {
        self.perf.lock().record(elapsed);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kernel", &self.kernel.name())
            .field("refs", &self.refs.iter().map(DataRef::id).collect::<Vec<_>>())
            .field("affinity", &self.affinity)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
