//! Verification pipeline implementation.

use crate::core::error::{VerifyReport, VerifyResult};
use crate::execution::plan::ExecutionPlan;
use crate::graph::structure::Graph;
use crate::validation::stages::{ParameterCheck, Planning, ResolveVirtuals, TopologyCheck, VerifyStage};
use std::time::Instant;

/// Multi-stage verification pipeline.
///
/// Runs a series of stages on a graph and, when all of them pass, caches the
/// plan they built. On the first error the graph is returned to the
/// unverified state with its virtual objects reset.
pub struct VerifyPipeline {
    stages: Vec<Box<dyn VerifyStage>>,
}

impl VerifyPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn VerifyStage>>) -> Self {
        Self { stages }
    }

    /// Create the standard pipeline.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                Box::new(ResolveVirtuals),
                Box::new(ParameterCheck),
                Box::new(TopologyCheck),
                Box::new(Planning),
            ],
        }
    }

    /// Add a custom stage after the existing ones.
    pub fn add_stage(&mut self, stage: Box<dyn VerifyStage>) {
        self.stages.push(stage);
    }

    /// Names of the stages in run order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Verify a graph through all stages.
    pub fn run(&self, graph: &mut Graph) -> VerifyResult<VerifyReport> {
        let start = Instant::now();
        let mut report = VerifyReport::new();
        let mut plan = ExecutionPlan::default();

        for stage in &self.stages {
            match stage.run(graph, &mut plan) {
                Ok(warnings) => {
                    for warning in warnings {
                        log::debug!("{}: {}", stage.name(), warning.message);
                        report.add_warning(warning);
                    }
                    report.stages.push(stage.name().to_string());
                }
                Err(error) => {
                    log::info!(
                        "verification of graph {} failed in {}: {}",
                        graph.id(),
                        stage.name(),
                        error
                    );
                    graph.abort_verification();
                    return Err(error);
                }
            }
        }

        report.duration_us = start.elapsed().as_micros() as u64;
        log::info!(
            "graph {} {} ({} nodes, {} levels, {} bytes)",
            graph.id(),
            report.summary(),
            plan.node_count(),
            plan.levels.len(),
            plan.memory.total_bytes
        );
        graph.install_plan(plan);
        Ok(report)
    }
}

impl Default for VerifyPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::error::{VerifyError, VerifyWarning};
    use crate::core::types::{GraphState, ImageFormat};

    struct RejectAll;

    impl VerifyStage for RejectAll {
        fn name(&self) -> &str {
            "Reject All"
        }

        fn run(&self, _graph: &mut Graph, _plan: &mut ExecutionPlan) -> VerifyResult<Vec<VerifyWarning>> {
            Err(VerifyError::CyclicGraph { nodes: Vec::new() })
        }
    }

    #[test]
    fn test_default_stage_order() {
        let pipeline = VerifyPipeline::default();
        assert_eq!(
            pipeline.stage_names(),
            vec!["Resolve Virtuals", "Parameter Check", "Topology Check", "Planning"]
        );
    }

    #[test]
    fn test_empty_graph_report() {
        let mut graph = Graph::new(Context::new_shared());
        let report = graph.verify_report().unwrap();
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(graph.state(), GraphState::Verified);
    }

    #[test]
    fn test_custom_stage_failure_resets_graph() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();

        let mut pipeline = VerifyPipeline::default_pipeline();
        pipeline.add_stage(Box::new(RejectAll));
        assert!(graph.verify_with(&pipeline).is_err());
        assert_eq!(graph.state(), GraphState::Unverified);
        assert!(graph.plan().is_none());
        assert_eq!(graph.data_desc(b).unwrap(), None);

        let report = graph.verify_report().unwrap();
        assert!(report.warnings.is_empty());
    }
}
