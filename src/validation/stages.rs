//! Individual verification stages.
//!
//! Each stage checks one category of errors and may fill in part of the
//! execution plan. Stages run in order and the first error stops the
//! pipeline, which gives the error precedence of verification.

use crate::core::context::ValidationContext;
use crate::core::data::{DataRef, Payload};
use crate::core::error::{
    DataError, DataId, NodeId, VerifyError, VerifyResult, VerifyWarning,
};
use crate::core::types::{DataDesc, Direction};
use crate::execution::plan::{ExecutionPlan, MemoryEntry};
use crate::graph::node::Node;
use crate::graph::structure::Graph;
use crate::graph::topology::TopologyAnalyzer;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Trait for verification stages.
pub trait VerifyStage: Send + Sync {
    /// Name of this stage.
    fn name(&self) -> &str;

    /// Check the graph, recording results in `plan`.
    ///
    /// Returns Ok with warnings, or the first error found.
    fn run(&self, graph: &mut Graph, plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>>;
}

/// Build the validation context of a node from the current descriptors.
///
/// Concrete input scalars expose their value.
pub(crate) fn validation_context(graph: &Graph, node: &Node) -> ValidationContext {
    let mut descs = Vec::with_capacity(node.refs().len());
    let mut values = Vec::with_capacity(node.refs().len());
    for (_, r, direction) in node.bindings() {
        let object = graph.arena().get(r).ok();
        descs.push(object.and_then(|o| o.desc()));
        let value = object
            .filter(|o| direction.reads() && !o.is_virtual())
            .and_then(|o| o.read().as_ref().and_then(Payload::as_scalar));
        values.push(value);
    }
    ValidationContext::new(node.id(), Arc::clone(node.metadata_arc()), descs, values)
}

fn desc_of(graph: &Graph, r: DataRef) -> Option<DataDesc> {
    graph.arena().get(r).ok().and_then(|o| o.desc())
}

// ============================================================================
// Resolve Virtuals
// ============================================================================

/// Infers the descriptor of every virtual object.
///
/// Virtuals are first reset to pending. Nodes are then visited in insertion
/// order until nothing changes; a node whose inputs are all known resolves
/// its virtual outputs.
pub struct ResolveVirtuals;

impl ResolveVirtuals {
    fn is_ready(graph: &Graph, node: &Node) -> bool {
        node.bindings()
            .filter(|(_, _, d)| d.reads())
            .all(|(_, r, _)| desc_of(graph, r).is_some())
    }

    fn infer_outputs(graph: &Graph, node: &Node) -> VerifyResult<Vec<(DataRef, DataDesc)>> {
        let ctx = validation_context(graph, node);
        let mut resolved = Vec::new();
        for (index, r, direction) in node.bindings() {
            if direction != Direction::Output {
                continue;
            }
            let object = graph.arena().get(r)?;
            if !object.is_virtual() || object.desc().is_some() {
                continue;
            }
            let desc = node
                .kernel()
                .output_descriptor(index, &ctx)
                .or_else(|| object.hint().and_then(|h| h.complete()))
                .ok_or_else(|| VerifyError::UnresolvableVirtual {
                    data: r.id(),
                    reason: format!(
                        "{} cannot infer parameter {} of node {}",
                        node.kernel_name(),
                        index,
                        node.id()
                    ),
                })?;
            resolved.push((r, desc));
        }
        Ok(resolved)
    }

    fn stuck_error(graph: &Graph, data: DataId) -> VerifyError {
        if graph.writers(data).is_empty() {
            return VerifyError::UnresolvableVirtual {
                data,
                reason: "no node produces it".to_string(),
            };
        }
        match TopologyAnalyzer::new(graph).topological_sort() {
            Err(cycle @ VerifyError::CyclicGraph { .. }) => cycle,
            _ => VerifyError::UnresolvableVirtual {
                data,
                reason: "its producer never receives all inputs".to_string(),
            },
        }
    }
}

impl VerifyStage for ResolveVirtuals {
    fn name(&self) -> &str {
        "Resolve Virtuals"
    }

    fn run(&self, graph: &mut Graph, _plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>> {
        for object in graph.arena_mut().iter_mut() {
            object.reset();
        }

        let ids: Vec<NodeId> = graph.node_ids().collect();
        let mut done: HashSet<NodeId> = HashSet::new();
        loop {
            let mut progressed = false;
            for &id in &ids {
                if done.contains(&id) {
                    continue;
                }
                let resolved = {
                    let node = match graph.node(id) {
                        Ok(node) => node,
                        Err(_) => continue,
                    };
                    if !Self::is_ready(graph, node) {
                        continue;
                    }
                    Self::infer_outputs(graph, node)?
                };
                for (r, desc) in resolved {
                    graph
                        .arena_mut()
                        .get_mut(r)?
                        .resolve(desc)
                        .map_err(|e| match e {
                            DataError::InvalidFormat { reason } => VerifyError::InvalidData {
                                data: r.id(),
                                reason,
                            },
                            e => e.into(),
                        })?;
                    log::debug!("resolved virtual {} to {}", r.id(), desc);
                }
                done.insert(id);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        let mut warnings = Vec::new();
        let mut stuck = None;
        for object in graph.arena().iter() {
            if !object.is_virtual() || object.desc().is_some() {
                continue;
            }
            // No node reads or writes it, so the run never touches it.
            if object.constraints().is_empty() {
                warnings.push(VerifyWarning {
                    message: format!("virtual {} is not bound to any node", object.id()),
                    node: None,
                });
            } else if stuck.is_none() {
                stuck = Some(object.id());
            }
        }
        match stuck {
            Some(data) => Err(Self::stuck_error(graph, data)),
            None => Ok(warnings),
        }
    }
}

// ============================================================================
// Parameter Check
// ============================================================================

/// Re-checks every binding against its slot with resolved descriptors, then
/// lets each kernel validate its parameters together.
pub struct ParameterCheck;

impl VerifyStage for ParameterCheck {
    fn name(&self) -> &str {
        "Parameter Check"
    }

    fn run(&self, graph: &mut Graph, _plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>> {
        let graph: &Graph = graph;
        for node in graph.nodes() {
            for (index, r, _) in node.bindings() {
                let desc = desc_of(graph, r).ok_or_else(|| VerifyError::UnresolvableVirtual {
                    data: r.id(),
                    reason: "unresolved when parameters were checked".to_string(),
                })?;
                let expected = &node.metadata().parameters[index].constraint;
                if !expected.accepts(&desc) {
                    return Err(VerifyError::ParameterTypeMismatch {
                        node: node.id(),
                        index,
                        expected: expected.clone(),
                        got: desc,
                    });
                }
            }

            let ctx = validation_context(graph, node);
            node.kernel()
                .validate(&ctx)
                .map_err(|e| VerifyError::InvalidParameters {
                    node: node.id(),
                    kernel: node.kernel_name().to_string(),
                    message: e.message,
                })?;
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// Topology Check
// ============================================================================

/// Enforces a single writer per object and computes the execution order and
/// dependency levels.
pub struct TopologyCheck;

impl VerifyStage for TopologyCheck {
    fn name(&self) -> &str {
        "Topology Check"
    }

    fn run(&self, graph: &mut Graph, plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>> {
        let analyzer = TopologyAnalyzer::new(graph);
        analyzer.check_single_writer()?;
        let order = analyzer.topological_sort()?;
        plan.levels = analyzer.levels(&order);
        plan.order = order;

        let mut warnings = Vec::new();
        if graph.is_empty() {
            warnings.push(VerifyWarning {
                message: "graph has no nodes".to_string(),
                node: None,
            });
        }
        Ok(warnings)
    }
}

// ============================================================================
// Planning
// ============================================================================

/// Assigns targets, allocates backing memory and initializes kernels.
pub struct Planning;

impl Planning {
    fn assign_targets(graph: &Graph, plan: &mut ExecutionPlan) -> VerifyResult<()> {
        let context = graph.context();
        for &id in &plan.order {
            let Ok(node) = graph.node(id) else { continue };
            let target = node
                .affinity()
                .or_else(|| context.assign(node.kernel_name()))
                .ok_or_else(|| VerifyError::NoTarget {
                    node: id,
                    kernel: node.kernel_name().to_string(),
                })?;
            log::debug!(
                "node {} ({}) runs on {}",
                id,
                node.kernel_name(),
                context.targets().get(target).map_or("?", |t| t.name())
            );
            plan.targets.insert(id, target);
        }
        Ok(())
    }

    /// First and last position in the order of every bound object.
    fn lifetimes(graph: &Graph, plan: &ExecutionPlan) -> BTreeMap<DataId, (usize, usize)> {
        let mut lifetimes = BTreeMap::new();
        for (position, &id) in plan.order.iter().enumerate() {
            let Ok(node) = graph.node(id) else { continue };
            for r in node.refs() {
                lifetimes
                    .entry(r.id())
                    .and_modify(|(_, last)| *last = position)
                    .or_insert((position, position));
            }
        }
        lifetimes
    }

    fn plan_memory(graph: &mut Graph, plan: &mut ExecutionPlan) -> VerifyResult<()> {
        let lifetimes = Self::lifetimes(graph, plan);
        let mut sizes = BTreeMap::new();
        for (data, (first_use, last_use)) in lifetimes {
            let Some(object) = graph.arena_mut().by_id_mut(data) else {
                continue;
            };
            plan.memory.allocated_bytes += object.allocate()?;
            let bytes = object.desc().map_or(0, |d| d.byte_size());
            sizes.insert(data, bytes);
            plan.memory.total_bytes += bytes;
            plan.memory.entries.push(MemoryEntry {
                data,
                bytes,
                first_use,
                last_use,
            });
        }

        for node in graph.nodes() {
            let bytes: usize = node
                .refs()
                .iter()
                .filter_map(|r| sizes.get(&r.id()))
                .sum();
            plan.bandwidth.insert(node.id(), bytes);
        }
        Ok(())
    }

    fn initialize(graph: &Graph, plan: &ExecutionPlan) -> VerifyResult<()> {
        for &id in &plan.order {
            let Ok(node) = graph.node(id) else { continue };
            let ctx = validation_context(graph, node);
            node.kernel()
                .initialize(&ctx)
                .map_err(|e| VerifyError::InitializeFailed {
                    node: id,
                    kernel: node.kernel_name().to_string(),
                    message: e.message,
                })?;
        }
        Ok(())
    }
}

impl VerifyStage for Planning {
    fn name(&self) -> &str {
        "Planning"
    }

    fn run(&self, graph: &mut Graph, plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>> {
        Self::assign_targets(graph, plan)?;
        Self::plan_memory(graph, plan)?;
        Self::initialize(graph, plan)?;
        Ok(Vec::new())
    }
}
