//! Verification: the checks that turn an edited graph into an executable one.
//!
//! The pipeline runs its stages in a fixed order, which is also the order in
//! which errors are reported.

pub mod pipeline;
pub mod stages;

pub use pipeline::VerifyPipeline;
pub use stages::{ParameterCheck, Planning, ResolveVirtuals, TopologyCheck, VerifyStage};
