//! Targets and node-to-target assignment.
//!
//! A target is a named execution context hosting a subset of the registered
//! kernels. When verification builds a plan, every node without an explicit
//! affinity is given a target by an [`AssignmentPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named execution context hosting a set of kernels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    name: String,
    kernels: BTreeSet<String>,
}

impl Target {
    /// Create a target hosting no kernels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kernels: BTreeSet::new(),
        }
    }

    /// Add a hosted kernel, builder style.
    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.add_kernel(kernel);
        self
    }

    /// Add a hosted kernel.
    pub fn add_kernel(&mut self, kernel: impl Into<String>) {
        self.kernels.insert(kernel.into());
    }

    /// Stop hosting a kernel.
    pub fn remove_kernel(&mut self, kernel: &str) -> bool {
        self.kernels.remove(kernel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this target can run the kernel.
    pub fn supports(&self, kernel: &str) -> bool {
        self.kernels.contains(kernel)
    }

    /// Hosted kernel names in sorted order.
    pub fn kernels(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.kernels.iter().map(String::as_str)
    }

    /// Number of hosted kernels.
    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }
}

/// Chooses which target runs a kernel.
///
/// Returning `None` means no acceptable target exists and verification fails.
pub trait AssignmentPolicy: Send + Sync + fmt::Debug {
    /// Name of this policy, for logging.
    fn name(&self) -> &str;

    /// Index into `targets` of the target that should run `kernel`.
    fn assign(&self, kernel: &str, targets: &[Target]) -> Option<usize>;
}

/// Built-in assignment policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    /// The lowest-index target that hosts the kernel.
    #[default]
    LowestIndex,

    /// A specific target by name.
    ///
    /// Fails if the named target doesn't exist or doesn't host the kernel.
    Named(String),
}

impl AssignmentPolicy for TargetPolicy {
    fn name(&self) -> &str {
        match self {
            TargetPolicy::LowestIndex => "lowest_index",
            TargetPolicy::Named(_) => "named",
        }
    }

    fn assign(&self, kernel: &str, targets: &[Target]) -> Option<usize> {
        match self {
            TargetPolicy::LowestIndex => targets.iter().position(|t| t.supports(kernel)),
            TargetPolicy::Named(name) => targets
                .iter()
                .position(|t| t.name() == name)
                .filter(|&i| targets[i].supports(kernel)),
        }
    }
}
