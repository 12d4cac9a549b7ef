//! Kernel module.
//!
//! Contains the kernel registry, execution targets and built-in kernels.

pub mod registry;
pub mod target;
pub mod builtin;

pub use registry::{KernelRegistry, RegisteredKernel};
pub use target::{AssignmentPolicy, Target, TargetPolicy};
