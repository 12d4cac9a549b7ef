//! Execution engine implementation.
//!
//! The engine runs the nodes of a verified graph in the order cached by its
//! plan, binding each node's data with the locks its slot directions call
//! for.

use crate::core::context::ExecutionContext;
use crate::core::error::{NodeId, ProcessError, ProcessResult};
use crate::execution::scheduler::Scheduler;
use crate::graph::node::NodeAction;
use crate::graph::structure::Graph;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Whether to run independent nodes of a level in parallel.
    pub parallel: bool,
    /// Maximum number of parallel threads (0 = use the global pool).
    pub max_threads: usize,
    /// Whether to record performance counters.
    pub collect_perf: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_threads: 0,
            collect_perf: true,
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Enable/disable performance counters.
    pub fn with_perf(mut self, collect: bool) -> Self {
        self.collect_perf = collect;
        self
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total execution time.
    pub total_duration: Duration,
    /// Number of nodes executed.
    pub nodes_executed: usize,
    /// Number of dependency levels in the plan.
    pub levels: usize,
    /// Whether levels ran in parallel.
    pub parallel: bool,
}

/// The execution engine.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    options: ExecutionOptions,
}

impl ExecutionEngine {
    /// Create an engine with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with the given options.
    pub fn with_options(options: ExecutionOptions) -> Self {
        Self { options }
    }

    /// The options this engine runs with.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Execute every node of a verified graph.
    ///
    /// Stops at the first failing node; nodes that already ran keep their
    /// side effects.
    pub fn execute(&self, graph: &Graph) -> ProcessResult<ExecutionStats> {
        let plan = graph
            .plan()
            .ok_or(ProcessError::GraphNotVerified { state: graph.state() })?;
        let start = Instant::now();
        let scheduler = Scheduler::from_options(&self.options);
        let executed = AtomicUsize::new(0);

        scheduler.run(plan, |id| {
            self.execute_node(graph, id)?;
            executed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;

        let total_duration = start.elapsed();
        if self.options.collect_perf {
            graph.record_perf(total_duration);
        }
        let stats = ExecutionStats {
            total_duration,
            nodes_executed: executed.into_inner(),
            levels: plan.levels.len(),
            parallel: scheduler.is_parallel(),
        };
        log::info!(
            "graph {} processed {} nodes in {:?}",
            graph.id(),
            stats.nodes_executed,
            stats.total_duration
        );
        Ok(stats)
    }

    /// Execute a single node.
    fn execute_node(&self, graph: &Graph, id: NodeId) -> ProcessResult<()> {
        let node = graph
            .node(id)
            .map_err(|_| ProcessError::GraphNotVerified { state: graph.state() })?;

        let mut bindings = Vec::with_capacity(node.refs().len());
        for (_, r, direction) in node.bindings() {
            let object = graph
                .data(r)
                .map_err(|source| ProcessError::Binding { node: id, source })?;
            bindings.push((object, direction));
        }

        log::debug!("dispatching node {} ({})", id, node.kernel_name());
        let start = Instant::now();
        let result = {
            let mut ctx = ExecutionContext::bind(id, bindings);
            node.kernel().execute(&mut ctx)
        };
        let elapsed = start.elapsed();

        if let Err(error) = result {
            log::warn!("node {} ({}) failed: {}", id, node.kernel_name(), error);
            return Err(ProcessError::Kernel {
                node: id,
                kernel: node.kernel_name().to_string(),
                code: error.code,
                message: error.message,
            });
        }
        if self.options.collect_perf {
            node.record(elapsed);
        }

        if let Some(callback) = node.callback() {
            if callback(id) == NodeAction::Abandon {
                log::info!("node {} abandoned graph {}", id, graph.id());
                return Err(ProcessError::Abandoned { node: id });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::types::{GraphState, ImageFormat};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn chain() -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(3, 1, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let c = graph.create_virtual();
        graph.write_image(a, &[1, 2, 3]).unwrap();
        let n0 = graph.add_node("org.khronos.openvx.not", &[a, b]).unwrap();
        let n1 = graph.add_node("org.khronos.openvx.not", &[b, c]).unwrap();
        (graph, vec![n0, n1])
    }

    #[test]
    fn test_execute_requires_plan() {
        let (graph, _) = chain();
        let engine = ExecutionEngine::new();
        assert!(matches!(
            engine.execute(&graph),
            Err(ProcessError::GraphNotVerified { .. })
        ));
    }

    #[test]
    fn test_stats_and_perf() {
        let (mut graph, nodes) = chain();
        graph.verify().unwrap();
        let stats = graph.process_with_stats().unwrap();
        assert_eq!(stats.nodes_executed, 2);
        assert_eq!(stats.levels, 2);
        assert!(!stats.parallel);

        graph.process().unwrap();
        assert_eq!(graph.node(nodes[0]).unwrap().perf().num, 2);
        assert_eq!(graph.perf().num, 2);
    }

    #[test]
    fn test_perf_disabled() {
        let (mut graph, nodes) = chain();
        graph.set_execution_options(ExecutionOptions::new().with_perf(false));
        graph.verify().unwrap();
        graph.process().unwrap();
        assert_eq!(graph.node(nodes[1]).unwrap().perf().num, 0);
    }

    #[test]
    fn test_callback_abandons() {
        let (mut graph, nodes) = chain();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        graph
            .set_callback(nodes[0], move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                NodeAction::Abandon
            })
            .unwrap();
        graph.verify().unwrap();

        assert_eq!(graph.process(), Err(ProcessError::Abandoned { node: nodes[0] }));
        assert_eq!(graph.state(), GraphState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(graph.node(nodes[1]).unwrap().perf().num, 0);

        graph.clear_callback(nodes[0]).unwrap();
        graph.process().unwrap();
        assert_eq!(graph.state(), GraphState::Completed);
    }
}
