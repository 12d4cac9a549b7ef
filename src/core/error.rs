//! Error types for vxgraph.
//!
//! Uses thiserror for structured errors with context. Every lifecycle phase
//! has its own error enum so callers can match on exactly the failures that
//! phase can produce:
//! - [`DataError`] for data object creation and payload access
//! - [`RegistryError`] for kernel and target registration
//! - [`NodeError`] for node construction and node edits
//! - [`VerifyError`] for graph verification
//! - [`ProcessError`] for graph execution
//!
//! Errors carrying only plain data are serializable so they can be logged or
//! shipped as structured diagnostics.

use crate::core::types::{DataDesc, GraphState, TypeConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a node, equal to its insertion index within the graph.
///
/// Node ids are never reused, so ordering by id is ordering by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Identifier of a data object, equal to its slot in the graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataId(pub u32);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Unique identifier of a graph, used to scope data references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identifier assigned to a kernel when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelId(pub u32);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Top-level error type for vxgraph.
///
/// Encompasses all error categories and enables `?` across phases.
#[derive(Error, Debug)]
pub enum VxError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Errors from creating data objects or accessing their payloads.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataError {
    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Type conflict on {data}: already {existing}, cannot become {requested}")]
    TypeConflict {
        data: DataId,
        existing: DataDesc,
        requested: DataDesc,
    },

    #[error("Data object {0} is not virtual")]
    NotVirtual(DataId),

    #[error("Invalid reference to data object {0}")]
    InvalidReference(DataId),

    #[error("Payload mismatch on {data}: expected {expected}, got {got}")]
    PayloadMismatch {
        data: DataId,
        expected: String,
        got: String,
    },

    #[error("Data object {0} has no backing memory yet")]
    NotAllocated(DataId),
}

/// Errors from the kernel registry and target table.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryError {
    #[error("Kernel '{name}' is already registered")]
    DuplicateKernel { name: String },

    #[error("Kernel '{name}' not found")]
    KernelNotFound { name: String },

    #[error("Target '{name}' not found")]
    TargetNotFound { name: String },

    #[error("Target '{name}' is already registered")]
    DuplicateTarget { name: String },
}

/// Errors from constructing or editing nodes.
///
/// Construction errors leave the graph untouched.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeError {
    #[error("Kernel '{name}' not found")]
    KernelNotFound { name: String },

    #[error("Kernel '{kernel}' takes {expected} parameters, got {got}")]
    ParameterCount {
        kernel: String,
        expected: usize,
        got: usize,
    },

    #[error("Parameter {index} of '{kernel}' expects {expected}, got {got}")]
    ParameterTypeMismatch {
        kernel: String,
        index: usize,
        expected: TypeConstraint,
        got: String,
    },

    #[error("Parameter {index} refers to an invalid data object {data}")]
    InvalidReference { index: usize, data: DataId },

    #[error("Data object {data} is bound to parameters {first} and {second}, and one of them writes it")]
    AliasedParameter {
        data: DataId,
        first: usize,
        second: usize,
    },

    #[error("Kernel '{kernel}' is not available on target '{target}'")]
    KernelNotOnTarget { kernel: String, target: String },

    #[error("Target '{name}' not found")]
    TargetNotFound { name: String },

    #[error("Node {0} not found")]
    NodeNotFound(NodeId),
}

/// Errors from the verification phase.
///
/// A failed verification leaves the graph unverified with no cached plan.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VerifyError {
    #[error("Virtual data object {data} cannot be resolved: {reason}")]
    UnresolvableVirtual { data: DataId, reason: String },

    #[error("Data object {data} is not a live object of this graph")]
    InvalidReference { data: DataId },

    #[error("Data object {data} is unusable: {reason}")]
    InvalidData { data: DataId, reason: String },

    #[error("Invalid data descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Type conflict on {data}: already {existing}, inferred {requested}")]
    TypeConflict {
        data: DataId,
        existing: DataDesc,
        requested: DataDesc,
    },

    #[error("Node {node} parameter {index} expects {expected}, bound to {got}")]
    ParameterTypeMismatch {
        node: NodeId,
        index: usize,
        expected: TypeConstraint,
        got: DataDesc,
    },

    #[error("Node {node} ({kernel}) rejected its parameters: {message}")]
    InvalidParameters {
        node: NodeId,
        kernel: String,
        message: String,
    },

    #[error("Data object {data} is written by more than one node: {writers:?}")]
    MultipleWriters { data: DataId, writers: Vec<NodeId> },

    #[error("Cycle detected in graph involving nodes: {nodes:?}")]
    CyclicGraph { nodes: Vec<NodeId> },

    #[error("No target hosts kernel '{kernel}' for node {node}")]
    NoTarget { node: NodeId, kernel: String },

    #[error("Node {node} ({kernel}) failed to initialize: {message}")]
    InitializeFailed {
        node: NodeId,
        kernel: String,
        message: String,
    },
}

/// Errors during graph execution.
///
/// Side effects of nodes that completed before the failure are kept.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessError {
    #[error("Graph is not verified (state: {state})")]
    GraphNotVerified { state: GraphState },

    #[error("Node {node} ({kernel}) failed with code {code}: {message}")]
    Kernel {
        node: NodeId,
        kernel: String,
        code: i32,
        message: String,
    },

    #[error("Node {node} abandoned the graph")]
    Abandoned { node: NodeId },

    #[error("Node {node} could not bind its data: {source}")]
    Binding { node: NodeId, source: DataError },
}

/// Error reported by a kernel from validate, initialize or execute.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("kernel error {code}: {message}")]
pub struct KernelError {
    /// Kernel-specific status code.
    pub code: i32,
    /// Human readable description.
    pub message: String,
}

impl KernelError {
    /// Generic failure code.
    pub const FAILURE: i32 = -1;
    /// A parameter has the wrong type or shape.
    pub const INVALID_PARAMETERS: i32 = -10;
    /// A slot was accessed in a way its direction does not allow.
    pub const INVALID_ACCESS: i32 = -11;

    /// Create an error with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a generic failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(Self::FAILURE, message)
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMETERS, message)
    }
}

// ============================================================================
// Error Utilities
// ============================================================================

impl VerifyError {
    /// Get list of affected node IDs.
    pub fn affected_nodes(&self) -> Vec<NodeId> {
        match self {
            VerifyError::ParameterTypeMismatch { node, .. }
            | VerifyError::InvalidParameters { node, .. }
            | VerifyError::NoTarget { node, .. }
            | VerifyError::InitializeFailed { node, .. } => vec![*node],
            VerifyError::MultipleWriters { writers, .. } => writers.clone(),
            VerifyError::CyclicGraph { nodes } => nodes.clone(),
            VerifyError::UnresolvableVirtual { .. }
            | VerifyError::InvalidReference { .. }
            | VerifyError::InvalidData { .. }
            | VerifyError::InvalidDescriptor { .. }
            | VerifyError::TypeConflict { .. } => vec![],
        }
    }

    /// Get the data object at the root of this error, if any.
    pub fn data_id(&self) -> Option<DataId> {
        match self {
            VerifyError::UnresolvableVirtual { data, .. }
            | VerifyError::InvalidReference { data }
            | VerifyError::InvalidData { data, .. }
            | VerifyError::TypeConflict { data, .. }
            | VerifyError::MultipleWriters { data, .. } => Some(*data),
            _ => None,
        }
    }
}

impl ProcessError {
    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ProcessError::Kernel { node, .. }
            | ProcessError::Abandoned { node }
            | ProcessError::Binding { node, .. } => Some(*node),
            ProcessError::GraphNotVerified { .. } => None,
        }
    }

    /// Check if re-running the verified graph may succeed.
    ///
    /// Kernel failures can be transient; a missing plan or a binding failure
    /// needs the graph to be fixed and re-verified first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Kernel { .. } | ProcessError::Abandoned { .. })
    }
}

impl From<DataError> for VerifyError {
    fn from(error: DataError) -> Self {
        let reason = error.to_string();
        match error {
            DataError::TypeConflict {
                data,
                existing,
                requested,
            } => VerifyError::TypeConflict {
                data,
                existing,
                requested,
            },
            DataError::InvalidReference(data) => VerifyError::InvalidReference { data },
            // Only a virtual object can lack a descriptor to allocate from.
            DataError::NotAllocated(data) => VerifyError::UnresolvableVirtual { data, reason },
            DataError::NotVirtual(data) | DataError::PayloadMismatch { data, .. } => {
                VerifyError::InvalidData { data, reason }
            }
            DataError::InvalidFormat { reason } => VerifyError::InvalidDescriptor { reason },
        }
    }
}

/// Result type alias for vxgraph operations.
pub type VxResult<T> = Result<T, VxError>;

/// Result type alias for data operations.
pub type DataResult<T> = Result<T, DataError>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Result type alias for verification.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Result type alias for processing.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Result type alias for kernel callbacks.
pub type KernelResult<T> = Result<T, KernelError>;

// ============================================================================
// Verification Report
// ============================================================================

/// Non-fatal finding from verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyWarning {
    /// Warning message.
    pub message: String,
    /// Node that triggered the warning, if applicable.
    pub node: Option<NodeId>,
}

/// Summary of a successful verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Warnings collected from every stage.
    pub warnings: Vec<VerifyWarning>,
    /// Names of the stages that ran.
    pub stages: Vec<String>,
    /// Time taken in microseconds.
    pub duration_us: u64,
}

impl VerifyReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: VerifyWarning) {
        self.warnings.push(warning);
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.warnings.is_empty() {
            format!("verified in {} stages", self.stages.len())
        } else {
            format!(
                "verified in {} stages with {} warning(s)",
                self.stages.len(),
                self.warnings.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ImageFormat;

    #[test]
    fn test_id_display() {
        assert_eq!(NodeId(3).to_string(), "N3");
        assert_eq!(DataId(12).to_string(), "D12");
        assert_eq!(GraphId::new().to_string().len(), 8);
    }

    #[test]
    fn test_affected_nodes() {
        let error = VerifyError::CyclicGraph {
            nodes: vec![NodeId(0), NodeId(1)],
        };
        assert_eq!(error.affected_nodes(), vec![NodeId(0), NodeId(1)]);

        let error = VerifyError::UnresolvableVirtual {
            data: DataId(4),
            reason: "no producer".to_string(),
        };
        assert!(error.affected_nodes().is_empty());
        assert_eq!(error.data_id(), Some(DataId(4)));
    }

    #[test]
    fn test_process_error_helpers() {
        let error = ProcessError::Kernel {
            node: NodeId(2),
            kernel: "org.khronos.debug.check_image".to_string(),
            code: 1,
            message: "mismatch".to_string(),
        };
        assert_eq!(error.node_id(), Some(NodeId(2)));
        assert!(error.is_retryable());

        let error = ProcessError::GraphNotVerified {
            state: GraphState::Unverified,
        };
        assert_eq!(error.node_id(), None);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_data_error_converts_to_type_conflict() {
        let error: VerifyError = DataError::TypeConflict {
            data: DataId(1),
            existing: DataDesc::image(2, 2, ImageFormat::U8),
            requested: DataDesc::image(2, 2, ImageFormat::S16),
        }
        .into();
        assert!(matches!(error, VerifyError::TypeConflict { .. }));
    }

    #[test]
    fn test_data_error_keeps_its_kind() {
        let error: VerifyError = DataError::InvalidReference(DataId(3)).into();
        assert_eq!(error, VerifyError::InvalidReference { data: DataId(3) });
        assert_eq!(error.data_id(), Some(DataId(3)));

        let error: VerifyError = DataError::NotVirtual(DataId(5)).into();
        assert!(matches!(error, VerifyError::InvalidData { data: DataId(5), .. }));

        let error: VerifyError = DataError::InvalidFormat {
            reason: "too large".to_string(),
        }
        .into();
        assert_eq!(
            error,
            VerifyError::InvalidDescriptor {
                reason: "too large".to_string()
            }
        );
        assert_eq!(error.data_id(), None);
        assert!(error.affected_nodes().is_empty());
    }

    #[test]
    fn test_errors_serialize() {
        let error = VerifyError::MultipleWriters {
            data: DataId(0),
            writers: vec![NodeId(0), NodeId(1)],
        };
        let json = serde_json::to_string(&error).unwrap();
        let back: VerifyError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, error);
    }
}
