//! Graph structure and lifecycle.
//!
//! The [`Graph`] owns its data objects and nodes and moves through the states
//! `Unverified -> Verified -> Running -> Completed | Failed`. Any structural
//! edit sends it back to `Unverified` and drops the cached plan:
//! - adding or removing a node
//! - changing a node's target affinity
//!
//! Payload access and completion callbacks leave the plan in place.

use crate::context::Context;
use crate::core::data::{DataArena, DataObject, DataRef, DataState, ImageBuffer, ImageHint, Payload};
use crate::core::error::{
    DataError, DataId, DataResult, GraphId, NodeError, NodeId, NodeResult, ProcessError,
    ProcessResult, VerifyReport, VerifyResult,
};
use crate::core::types::{DataDesc, GraphState, ImageFormat, ScalarType, ScalarValue, TypeConstraint};
use crate::execution::engine::{ExecutionEngine, ExecutionOptions, ExecutionStats};
use crate::execution::perf::Perf;
use crate::execution::plan::ExecutionPlan;
use crate::graph::node::{Node, NodeAction};
use crate::kernels::registry::RegisteredKernel;
use crate::validation::pipeline::VerifyPipeline;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A graph of kernel nodes over data objects.
pub struct Graph {
    id: GraphId,
    context: Arc<Context>,
    data: DataArena,
    nodes: IndexMap<NodeId, Node>,
    next_node: u32,
    /// Writers of each data object, in insertion order.
    producers: BTreeMap<DataId, Vec<NodeId>>,
    state: GraphState,
    plan: Option<ExecutionPlan>,
    /// Overrides the context's execution options when set.
    options: Option<ExecutionOptions>,
    perf: Mutex<Perf>,
}

impl Graph {
    /// Create an empty graph using kernels from `context`.
    pub fn new(context: Arc<Context>) -> Self {
        let id = GraphId::new();
        log::debug!("created graph {}", id);
        Self {
            id,
            context,
            data: DataArena::new(id),
            nodes: IndexMap::new(),
            next_node: 0,
            producers: BTreeMap::new(),
            state: GraphState::Unverified,
            plan: None,
            options: None,
            perf: Mutex::new(Perf::new()),
        }
    }

    /// Unique id of this graph, carried by every handle it hands out.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The context this graph resolves kernels against.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// The plan cached by the last successful verification.
    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Cached execution order, if verified.
    pub fn execution_order(&self) -> Option<&[NodeId]> {
        self.plan.as_ref().map(|p| p.order.as_slice())
    }

    /// Execution options used by `process()`.
    pub fn execution_options(&self) -> &ExecutionOptions {
        self.options
            .as_ref()
            .unwrap_or_else(|| self.context.execution_options())
    }

    /// Override the context's execution options for this graph.
    pub fn set_execution_options(&mut self, options: ExecutionOptions) {
        self.options = Some(options);
    }

    /// Graph-level performance counters.
    pub fn perf(&self) -> Perf {
        *self.perf.lock()
    }

    pub(crate) fn record_perf(&self, elapsed: Duration) {
        self.perf.lock().record(elapsed);
    }

    fn invalidate(&mut self) {
        if self.state != GraphState::Unverified {
            log::debug!("graph {} invalidated ({})", self.id, self.state);
        }
        self.state = GraphState::Unverified;
        self.plan = None;
    }

    // ========================================================================
    // Data Objects
    // ========================================================================

    /// Create a concrete data object from a full descriptor.
    pub fn create_data(&mut self, desc: DataDesc) -> DataResult<DataRef> {
        self.data.create(desc)
    }

    /// Create a zero-filled image.
    pub fn create_image(&mut self, width: u32, height: u32, format: ImageFormat) -> DataResult<DataRef> {
        self.data.create(DataDesc::image(width, height, format))
    }

    /// Create a scalar holding `value`.
    pub fn create_scalar(&mut self, value: ScalarValue) -> DataRef {
        self.data.create_scalar(value)
    }

    /// Create an empty array.
    pub fn create_array(&mut self, item: ScalarType, capacity: usize) -> DataResult<DataRef> {
        self.data.create(DataDesc::array(item, capacity))
    }

    /// Create a virtual object whose type is inferred at verification.
    pub fn create_virtual(&mut self) -> DataRef {
        self.data.create_virtual()
    }

    /// Create a virtual image with some descriptor fields pinned.
    pub fn create_virtual_image(&mut self, hint: ImageHint) -> DataResult<DataRef> {
        self.data.create_virtual_image(hint)
    }

    /// Look up a data object.
    pub fn data(&self, data_ref: DataRef) -> DataResult<&DataObject> {
        self.data.get(data_ref)
    }

    /// Current descriptor of a data object, `None` while virtual and unresolved.
    pub fn data_desc(&self, data_ref: DataRef) -> DataResult<Option<DataDesc>> {
        self.data.get(data_ref).map(DataObject::desc)
    }

    /// Number of live data objects.
    pub fn data_count(&self) -> usize {
        self.data.len()
    }

    /// Take another client reference to a data object.
    pub fn retain(&self, data_ref: DataRef) -> DataResult<usize> {
        self.data.get(data_ref).map(DataObject::retain)
    }

    /// Drop a client reference, returning the client references left.
    ///
    /// Nodes keep their own references, so the object is freed only once it
    /// is also unbound. Releasing more handles than were taken fails with
    /// `InvalidReference`.
    pub fn release(&mut self, data_ref: DataRef) -> DataResult<usize> {
        self.data.release(data_ref)
    }

    pub(crate) fn arena(&self) -> &DataArena {
        &self.data
    }

    pub(crate) fn arena_mut(&mut self) -> &mut DataArena {
        &mut self.data
    }

    // ========================================================================
    // Payload Access
    // ========================================================================

    fn with_payload<T>(
        &self,
        data_ref: DataRef,
        f: impl FnOnce(&Payload) -> DataResult<T>,
    ) -> DataResult<T> {
        let object = self.data.get(data_ref)?;
        let guard = object.read();
        let payload = guard.as_ref().ok_or(DataError::NotAllocated(data_ref.id()))?;
        f(payload)
    }

    fn with_payload_mut<T>(
        &self,
        data_ref: DataRef,
        f: impl FnOnce(&mut Payload) -> DataResult<T>,
    ) -> DataResult<T> {
        let object = self.data.get(data_ref)?;
        let mut guard = object.write();
        let payload = guard.as_mut().ok_or(DataError::NotAllocated(data_ref.id()))?;
        f(payload)
    }

    /// Copy of an image's pixel bytes.
    pub fn read_image(&self, data_ref: DataRef) -> DataResult<Vec<u8>> {
        self.read_image_buffer(data_ref).map(|image| image.data)
    }

    /// Copy of an image with its shape.
    pub fn read_image_buffer(&self, data_ref: DataRef) -> DataResult<ImageBuffer> {
        self.with_payload(data_ref, |payload| {
            payload
                .as_image()
                .cloned()
                .ok_or_else(|| mismatch(data_ref, "image", payload.kind()))
        })
    }

    /// Overwrite an image's pixel bytes; the length must match exactly.
    pub fn write_image(&self, data_ref: DataRef, bytes: &[u8]) -> DataResult<()> {
        self.with_payload_mut(data_ref, |payload| {
            let kind = payload.kind();
            let image = payload
                .as_image_mut()
                .ok_or_else(|| mismatch(data_ref, "image", kind))?;
            if image.data.len() != bytes.len() {
                return Err(DataError::PayloadMismatch {
                    data: data_ref.id(),
                    expected: format!("{} bytes", image.data.len()),
                    got: format!("{} bytes", bytes.len()),
                });
            }
            image.data.copy_from_slice(bytes);
            Ok(())
        })
    }

    /// Current value of a scalar.
    pub fn read_scalar(&self, data_ref: DataRef) -> DataResult<ScalarValue> {
        self.with_payload(data_ref, |payload| {
            payload
                .as_scalar()
                .ok_or_else(|| mismatch(data_ref, "scalar", payload.kind()))
        })
    }

    /// Store a scalar value of the object's type.
    pub fn write_scalar(&self, data_ref: DataRef, value: ScalarValue) -> DataResult<()> {
        self.with_payload_mut(data_ref, |payload| match payload {
            Payload::Scalar(current) if current.scalar_type() == value.scalar_type() => {
                *current = value;
                Ok(())
            }
            Payload::Scalar(current) => Err(DataError::PayloadMismatch {
                data: data_ref.id(),
                expected: current.scalar_type().to_string(),
                got: value.scalar_type().to_string(),
            }),
            other => Err(mismatch(data_ref, "scalar", other.kind())),
        })
    }

    /// Copy of an array's items.
    pub fn read_array(&self, data_ref: DataRef) -> DataResult<Vec<ScalarValue>> {
        self.with_payload(data_ref, |payload| {
            payload
                .as_array()
                .map(|array| array.items.clone())
                .ok_or_else(|| mismatch(data_ref, "array", payload.kind()))
        })
    }

    /// Replace an array's items, truncating to its capacity.
    pub fn write_array(&self, data_ref: DataRef, items: &[ScalarValue]) -> DataResult<()> {
        self.with_payload_mut(data_ref, |payload| {
            let kind = payload.kind();
            let array = payload
                .as_array_mut()
                .ok_or_else(|| mismatch(data_ref, "array", kind))?;
            let item = array.item;
            array.set_items(items).map_err(|got| DataError::PayloadMismatch {
                data: data_ref.id(),
                expected: item.to_string(),
                got: got.to_string(),
            })
        })
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> NodeResult<&Node> {
        self.nodes.get(&id).ok_or(NodeError::NodeNotFound(id))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes that write a data object, in insertion order.
    pub fn writers(&self, data: DataId) -> &[NodeId] {
        self.producers.get(&data).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn producers(&self) -> &BTreeMap<DataId, Vec<NodeId>> {
        &self.producers
    }

    /// Create a node binding the named kernel to `refs`.
    ///
    /// Nothing is changed when any check fails.
    pub fn add_node(&mut self, kernel: &str, refs: &[DataRef]) -> NodeResult<NodeId> {
        let kernel = self
            .context
            .lookup(kernel)
            .map_err(|_| NodeError::KernelNotFound {
                name: kernel.to_string(),
            })?
            .clone();
        self.add_node_with_kernel(kernel, refs)
    }

    /// Create a node from a kernel already looked up in the registry.
    pub fn add_node_with_kernel(
        &mut self,
        kernel: RegisteredKernel,
        refs: &[DataRef],
    ) -> NodeResult<NodeId> {
        let metadata = Arc::clone(&kernel.metadata);
        let expected = metadata.parameter_count();
        if refs.len() != expected {
            return Err(NodeError::ParameterCount {
                kernel: metadata.name.clone(),
                expected,
                got: refs.len(),
            });
        }

        let mut objects = Vec::with_capacity(refs.len());
        for (index, r) in refs.iter().enumerate() {
            let object = self
                .data
                .get(*r)
                .map_err(|_| NodeError::InvalidReference { index, data: r.id() })?;
            objects.push(object);
        }

        let params = &metadata.parameters;
        for (first, a) in refs.iter().enumerate() {
            for (second, b) in refs.iter().enumerate().skip(first + 1) {
                let writes = params[first].direction.writes() || params[second].direction.writes();
                if a.id() == b.id() && writes {
                    return Err(NodeError::AliasedParameter {
                        data: a.id(),
                        first,
                        second,
                    });
                }
            }
        }

        for (index, (object, param)) in objects.iter().zip(params).enumerate() {
            check_binding(object, &param.constraint).map_err(|got| {
                NodeError::ParameterTypeMismatch {
                    kernel: metadata.name.clone(),
                    index,
                    expected: param.constraint.clone(),
                    got,
                }
            })?;
        }

        let id = NodeId(self.next_node);
        self.next_node += 1;
        for (r, param) in refs.iter().zip(params) {
            if let Some(object) = self.data.by_id_mut(r.id()) {
                object.retain_internal();
                if object.is_virtual() {
                    object.add_constraint(id, param.constraint.clone());
                }
            }
            if param.direction.writes() {
                self.producers.entry(r.id()).or_default().push(id);
            }
        }

        log::debug!("added node {} ({}) to graph {}", id, metadata.name, self.id);
        self.nodes.insert(id, Node::new(id, kernel, refs.to_vec()));
        self.invalidate();
        Ok(id)
    }

    /// Remove a node, releasing its bindings.
    pub fn remove_node(&mut self, id: NodeId) -> NodeResult<()> {
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(NodeError::NodeNotFound(id))?;

        for &r in node.refs() {
            if let Some(object) = self.data.by_id_mut(r.id()) {
                object.remove_constraints(id);
            }
            if let Err(e) = self.data.release_internal(r) {
                log::warn!("node {} held a stale binding: {}", id, e);
            }
        }
        for writers in self.producers.values_mut() {
            writers.retain(|&n| n != id);
        }
        self.producers.retain(|_, writers| !writers.is_empty());

        log::debug!("removed node {} from graph {}", id, self.id);
        self.invalidate();
        Ok(())
    }

    /// Pin a node to a target, overriding the assignment policy.
    pub fn assign_target(&mut self, id: NodeId, target: &str) -> NodeResult<()> {
        let index = self
            .context
            .target_index(target)
            .map_err(|_| NodeError::TargetNotFound {
                name: target.to_string(),
            })?;
        let node = self.nodes.get_mut(&id).ok_or(NodeError::NodeNotFound(id))?;
        if !self.context.targets()[index].supports(node.kernel_name()) {
            return Err(NodeError::KernelNotOnTarget {
                kernel: node.kernel_name().to_string(),
                target: target.to_string(),
            });
        }
        node.set_affinity(Some(index));
        self.invalidate();
        Ok(())
    }

    /// Let the assignment policy choose the node's target again.
    pub fn clear_target(&mut self, id: NodeId) -> NodeResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(NodeError::NodeNotFound(id))?;
        node.set_affinity(None);
        self.invalidate();
        Ok(())
    }

    /// Attach a completion callback to a node.
    pub fn set_callback<F>(&mut self, id: NodeId, callback: F) -> NodeResult<()>
    where
        F: Fn(NodeId) -> NodeAction + Send + Sync + 'static,
    {
        let node = self.nodes.get_mut(&id).ok_or(NodeError::NodeNotFound(id))?;
        node.set_callback(Some(Arc::new(callback)));
        Ok(())
    }

    /// Detach a node's completion callback.
    pub fn clear_callback(&mut self, id: NodeId) -> NodeResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(NodeError::NodeNotFound(id))?;
        node.set_callback(None);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Verify the graph and cache an execution plan.
    ///
    /// Returns immediately when a plan from an earlier verification is
    /// still valid.
    pub fn verify(&mut self) -> VerifyResult<()> {
        self.verify_report().map(|_| ())
    }

    /// Verify and return the report of the stages that ran.
    pub fn verify_report(&mut self) -> VerifyResult<VerifyReport> {
        if self.plan.is_some() && self.state.has_plan() {
            log::debug!("graph {} already verified", self.id);
            return Ok(VerifyReport::new());
        }
        VerifyPipeline::default_pipeline().run(self)
    }

    /// Verify with a custom pipeline, discarding any cached plan first.
    pub fn verify_with(&mut self, pipeline: &VerifyPipeline) -> VerifyResult<VerifyReport> {
        self.invalidate();
        pipeline.run(self)
    }

    pub(crate) fn install_plan(&mut self, plan: ExecutionPlan) {
        self.plan = Some(plan);
        self.state = GraphState::Verified;
    }

    /// Drop a partial verification: virtuals go back to pending.
    pub(crate) fn abort_verification(&mut self) {
        for object in self.data.iter_mut() {
            object.reset();
        }
        self.invalidate();
    }

    /// Execute every node of the verified graph in plan order.
    pub fn process(&mut self) -> ProcessResult<()> {
        self.process_with_stats().map(|_| ())
    }

    /// Execute and return execution statistics.
    pub fn process_with_stats(&mut self) -> ProcessResult<ExecutionStats> {
        if self.plan.is_none() || !self.state.has_plan() {
            return Err(ProcessError::GraphNotVerified { state: self.state });
        }

        self.state = GraphState::Running;
        let engine = ExecutionEngine::with_options(self.execution_options().clone());
        let result = engine.execute(self);
        self.state = match result {
            Ok(_) => GraphState::Completed,
            Err(_) => GraphState::Failed,
        };
        result
    }
}

fn mismatch(data_ref: DataRef, expected: &str, got: &str) -> DataError {
    DataError::PayloadMismatch {
        data: data_ref.id(),
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

/// Check a binding at node construction.
///
/// Concrete objects must satisfy the slot; virtual objects must stay
/// compatible with the slots already bound to them and with their hint.
fn check_binding(object: &DataObject, constraint: &TypeConstraint) -> Result<(), String> {
    if let DataState::Concrete(desc) = object.state() {
        return if constraint.accepts(desc) {
            Ok(())
        } else {
            Err(desc.to_string())
        };
    }

    if let Some((_, existing)) = object
        .constraints()
        .iter()
        .find(|(_, c)| !c.overlaps(constraint))
    {
        return Err(format!("virtual object constrained to {}", existing));
    }
    if let Some(hint) = object.hint() {
        let pinned = match hint.format {
            Some(format) => TypeConstraint::Image(format),
            None => TypeConstraint::AnyImage,
        };
        if !pinned.overlaps(constraint) {
            return Err(format!("virtual {}", pinned));
        }
    }
    Ok(())
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("nodes", &self.nodes.values().collect::<Vec<_>>())
            .field("data", &self.data.len())
            .field("verified", &self.plan.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::VerifyError;

    fn graph() -> Graph {
        Graph::new(Context::new_shared())
    }

    #[test]
    fn test_add_node_checks_kernel_and_count() {
        let mut graph = graph();
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();

        assert!(matches!(
            graph.add_node("org.khronos.nothing", &[a]),
            Err(NodeError::KernelNotFound { .. })
        ));
        assert_eq!(
            graph.add_node("org.khronos.copy_image", &[a]),
            Err(NodeError::ParameterCount {
                kernel: "org.khronos.copy_image".to_string(),
                expected: 2,
                got: 1,
            })
        );
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.data(a).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_add_node_rejects_foreign_and_freed_refs() {
        let mut first = graph();
        let mut second = graph();
        let foreign = second.create_image(4, 4, ImageFormat::U8).unwrap();
        let out = first.create_virtual();
        assert_eq!(
            first.add_node("org.khronos.copy_image", &[foreign, out]),
            Err(NodeError::InvalidReference {
                index: 0,
                data: foreign.id(),
            })
        );

        let freed = first.create_image(4, 4, ImageFormat::U8).unwrap();
        assert_eq!(first.release(freed).unwrap(), 0);
        assert!(matches!(
            first.add_node("org.khronos.copy_image", &[freed, out]),
            Err(NodeError::InvalidReference { index: 0, .. })
        ));
    }

    #[test]
    fn test_add_node_rejects_aliasing() {
        let mut graph = graph();
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        assert_eq!(
            graph.add_node("org.khronos.copy_image", &[a, a]),
            Err(NodeError::AliasedParameter {
                data: a.id(),
                first: 0,
                second: 1,
            })
        );

        let policy = graph.create_scalar(ScalarValue::Enum(0));
        let out = graph.create_virtual();
        graph
            .add_node("org.khronos.openvx.add", &[a, a, policy, out])
            .unwrap();
    }

    #[test]
    fn test_virtual_constraints_must_overlap() {
        let mut graph = graph();
        let value = graph.create_scalar(ScalarValue::U32(0));
        let image = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        let v = graph.create_virtual();

        graph.add_node("org.khronos.copy_image", &[image, v]).unwrap();
        let err = graph
            .add_node("org.khronos.debug.check_image", &[image, value, v])
            .unwrap_err();
        assert!(matches!(err, NodeError::ParameterTypeMismatch { index: 2, .. }));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_binding_retains_and_remove_releases() {
        let mut graph = graph();
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let node = graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();

        assert_eq!(graph.data(a).unwrap().ref_count(), 2);
        assert_eq!(graph.data(a).unwrap().internal_count(), 1);
        assert_eq!(graph.writers(b.id()), &[node]);
        assert_eq!(graph.data(b).unwrap().constraints().len(), 1);

        graph.remove_node(node).unwrap();
        assert_eq!(graph.data(a).unwrap().ref_count(), 1);
        assert_eq!(graph.data(a).unwrap().internal_count(), 0);
        assert!(graph.writers(b.id()).is_empty());
        assert!(graph.data(b).unwrap().constraints().is_empty());
        assert_eq!(graph.remove_node(node), Err(NodeError::NodeNotFound(node)));
    }

    #[test]
    fn test_release_while_bound_keeps_object() {
        let mut graph = graph();
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();

        assert_eq!(graph.release(a).unwrap(), 0);
        graph.verify().unwrap();
        graph.process().unwrap();
    }

    #[test]
    fn test_extra_release_cannot_free_bound_object() {
        let mut graph = graph();
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let node = graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();

        assert_eq!(graph.release(a).unwrap(), 0);
        assert_eq!(graph.release(a), Err(DataError::InvalidReference(a.id())));
        assert_eq!(graph.data(a).unwrap().internal_count(), 1);
        graph.verify().unwrap();
        graph.process().unwrap();

        graph.remove_node(node).unwrap();
        assert!(matches!(graph.data(a), Err(DataError::InvalidReference(_))));
        assert!(graph.data(b).is_ok());
    }

    #[test]
    fn test_edits_invalidate() {
        let mut graph = graph();
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let node = graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();
        graph.verify().unwrap();
        assert_eq!(graph.state(), GraphState::Verified);

        graph.set_callback(node, |_| NodeAction::Continue).unwrap();
        assert_eq!(graph.state(), GraphState::Verified);

        graph.assign_target(node, crate::kernels::builtin::DEFAULT_TARGET).unwrap();
        assert_eq!(graph.state(), GraphState::Unverified);
        assert!(graph.plan().is_none());

        assert!(matches!(
            graph.assign_target(node, "nowhere"),
            Err(NodeError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn test_process_requires_verification() {
        let mut graph = graph();
        assert_eq!(
            graph.process(),
            Err(ProcessError::GraphNotVerified {
                state: GraphState::Unverified,
            })
        );
    }

    #[test]
    fn test_payload_access() {
        let mut graph = graph();
        let image = graph.create_image(2, 1, ImageFormat::U8).unwrap();
        let scalar = graph.create_scalar(ScalarValue::U8(3));
        let v = graph.create_virtual();

        assert!(matches!(
            graph.write_image(image, &[1, 2, 3]),
            Err(DataError::PayloadMismatch { .. })
        ));
        graph.write_image(image, &[1, 2]).unwrap();
        assert_eq!(graph.read_image_buffer(image).unwrap().desc(), DataDesc::image(2, 1, ImageFormat::U8));

        assert!(graph.write_scalar(scalar, ScalarValue::U32(1)).is_err());
        graph.write_scalar(scalar, ScalarValue::U8(9)).unwrap();
        assert_eq!(graph.read_scalar(scalar).unwrap(), ScalarValue::U8(9));
        assert!(matches!(graph.read_image(scalar), Err(DataError::PayloadMismatch { .. })));

        assert_eq!(graph.read_image(v), Err(DataError::NotAllocated(v.id())));
    }

    #[test]
    fn test_failed_verification_resets_virtuals() {
        let mut graph = graph();
        let a = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let c = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();
        graph.add_node("org.khronos.copy_image", &[b, c]).unwrap();

        assert!(matches!(graph.verify(), Err(VerifyError::InvalidParameters { .. })));
        assert_eq!(graph.state(), GraphState::Unverified);
        assert_eq!(graph.data_desc(b).unwrap(), None);
        assert!(!graph.data(b).unwrap().is_allocated());
    }
}
