//! Core types and traits for the vxgraph kernel graph engine.
//!
//! This module contains the foundational pieces every other module builds on:
//! - Descriptor types (image formats, scalar types, slot constraints)
//! - Data objects and the graph-scoped arena that owns them
//! - The kernel trait and kernel metadata
//! - Validation and execution contexts
//! - Error types

pub mod types;
pub mod data;
pub mod error;
pub mod context;
pub mod kernel;

// Re-export commonly used types
pub use types::{DataDesc, Direction, GraphState, ImageFormat, ScalarType, ScalarValue, TypeConstraint};
pub use data::{ArrayBuffer, DataArena, DataObject, DataRef, DataState, ImageBuffer, ImageHint, Payload};
pub use error::{DataError, KernelError, NodeError, ProcessError, RegistryError, VerifyError, VxError};
pub use context::{ExecutionContext, ValidationContext};
pub use kernel::{Kernel, KernelMetadata, ParameterDefinition};
