//! # vxgraph - Kernel Graph Execution
//!
//! vxgraph builds directed graphs of image-processing kernels over typed data
//! objects, verifies them once and then runs them as often as needed.
//!
//! ## Features
//!
//! - **Typed Data Objects**: Images, scalars and arrays with fixed descriptors
//! - **Virtual Intermediates**: Descriptors of virtual objects are inferred at verification
//! - **Verify Once, Process Many**: Verification caches an execution plan until the next edit
//! - **Targets**: Kernels are hosted on named targets chosen by an assignment policy
//! - **Parallel Execution**: Independent nodes of a level can run concurrently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vxgraph::prelude::*;
//!
//! // Create a context with the built-in kernels
//! let context = Context::new_shared();
//! let mut graph = Graph::new(context);
//!
//! // Create data objects
//! let input = graph.create_image(640, 480, ImageFormat::U8)?;
//! let blurred = graph.create_virtual();
//! let output = graph.create_image(640, 480, ImageFormat::U8)?;
//!
//! // Add nodes
//! graph.add_node("org.khronos.openvx.box3x3", &[input, blurred])?;
//! graph.add_node("org.khronos.openvx.not", &[blurred, output])?;
//!
//! // Verify once, then process as often as needed
//! graph.verify()?;
//! graph.write_image(input, &pixels)?;
//! graph.process()?;
//! let result = graph.read_image(output)?;
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`core`]: Core types, data objects, the kernel trait and error handling
//! - [`kernels`]: Kernel registry, targets and built-in kernels
//! - [`context`]: The process-wide context that owns kernels and targets
//! - [`graph`]: Graph structure, topology analysis and DOT export
//! - [`validation`]: Multi-stage verification pipeline
//! - [`execution`]: Execution engine, plans and scheduling
//! - [`config`]: TOML configuration
//!
//! ## Creating Custom Kernels
//!
//! Implement the [`Kernel`](core::kernel::Kernel) trait and register it with
//! the context:
//!
//! ```rust,ignore
//! use vxgraph::prelude::*;
//!
//! struct Invert;
//!
//! impl Kernel for Invert {
//!     fn metadata(&self) -> KernelMetadata {
//!         KernelMetadata::builder("com.example.invert")
//!             .description("Invert a U8 image")
//!             .input("input", TypeConstraint::Image(ImageFormat::U8))
//!             .output("output", TypeConstraint::Image(ImageFormat::U8))
//!             .build()
//!     }
//!
//!     fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
//!         let (src, dst) = ctx.unary_image(0, 1)?;
//!         for (d, s) in dst.data.iter_mut().zip(&src.data) {
//!             *d = !*s;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let context = Context::builder().register(Invert).build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod core;
pub mod execution;
pub mod graph;
pub mod kernels;
pub mod validation;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use vxgraph::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{
        DataDesc, Direction, GraphState, ImageFormat, ScalarType, ScalarValue, TypeConstraint,
    };

    // Data objects
    pub use crate::core::data::{ArrayBuffer, DataRef, ImageBuffer, ImageHint, Payload};

    // Kernels
    pub use crate::core::kernel::{Kernel, KernelMetadata, ParameterDefinition};
    pub use crate::core::context::{ExecutionContext, ValidationContext};

    // Errors
    pub use crate::core::error::{
        DataError, DataId, KernelError, KernelResult, NodeError, NodeId, ProcessError,
        RegistryError, VerifyError, VerifyReport, VerifyWarning, VxError, VxResult,
    };

    // Context and configuration
    pub use crate::config::Config;
    pub use crate::context::{Context, ContextBuilder};
    pub use crate::kernels::registry::{KernelRegistry, RegisteredKernel};
    pub use crate::kernels::target::{AssignmentPolicy, Target, TargetPolicy};

    // Graph
    pub use crate::graph::dot::to_dot;
    pub use crate::graph::node::{Node, NodeAction};
    pub use crate::graph::structure::Graph;
    pub use crate::graph::topology::TopologyAnalyzer;

    // Verification
    pub use crate::validation::pipeline::VerifyPipeline;
    pub use crate::validation::stages::VerifyStage;

    // Execution
    pub use crate::execution::engine::{ExecutionEngine, ExecutionOptions, ExecutionStats};
    pub use crate::execution::perf::Perf;
    pub use crate::execution::plan::ExecutionPlan;
    pub use crate::execution::schedule::ScheduledGraph;

    // Built-in kernels
    pub use crate::kernels::builtin::{
        // Copy
        CopyArray, CopyImage,
        // Debug
        CheckImage, FillImage,
        // Arithmetic
        AbsDiff, Add, ConvertPolicy, Subtract,
        // Bitwise
        And, Not, Or, Xor,
        // Filter
        Box3x3,
        DEFAULT_TARGET,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "vxgraph");
    }

    #[test]
    fn test_context_with_builtins() {
        let context = Context::new();
        assert_eq!(context.targets().len(), 1);
        assert_eq!(context.targets()[0].name(), DEFAULT_TARGET);
        assert!(context.lookup("org.khronos.copy_image").is_ok());
        assert_eq!(context.kernel_parameter_count("org.khronos.openvx.add").unwrap(), 4);
    }

    #[test]
    fn test_basic_graph() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_virtual();
        let c = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.copy_image", &[a, b]).unwrap();
        graph.add_node("org.khronos.copy_image", &[b, c]).unwrap();
        assert_eq!(graph.node_count(), 2);

        graph.write_image(a, &[1, 2, 3, 4]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();
        assert_eq!(graph.read_image(c).unwrap(), vec![1, 2, 3, 4]);
    }
}
