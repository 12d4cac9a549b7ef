//! Kernel registry for managing available kernels.

use crate::core::error::{KernelId, RegistryError, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Registry entry: the kernel plus its cached metadata.
#[derive(Clone)]
pub struct RegisteredKernel {
    /// Id assigned at registration.
    pub id: KernelId,
    /// Cached metadata (avoids rebuilding it on every lookup).
    pub metadata: Arc<KernelMetadata>,
    /// The kernel implementation.
    pub kernel: Arc<dyn Kernel>,
}

impl RegisteredKernel {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl fmt::Debug for RegisteredKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredKernel")
            .field("id", &self.id)
            .field("name", &self.metadata.name)
            .field("parameters", &self.metadata.parameters.len())
            .finish()
    }
}

/// Registry for all available kernels.
///
/// Names are opaque unique identifiers; the registry never parses them.
/// Kernels are kept sorted by name so enumeration is deterministic.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    kernels: BTreeMap<String, RegisteredKernel>,
    next_id: u32,
}

impl KernelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel.
    pub fn register<K>(&mut self, kernel: K) -> RegistryResult<KernelId>
    where
        K: Kernel + 'static,
    {
        self.register_arc(Arc::new(kernel))
    }

    /// Register a shared kernel instance.
    pub fn register_arc(&mut self, kernel: Arc<dyn Kernel>) -> RegistryResult<KernelId> {
        let metadata = kernel.metadata();
        if self.kernels.contains_key(&metadata.name) {
            return Err(RegistryError::DuplicateKernel {
                name: metadata.name,
            });
        }

        let id = KernelId(self.next_id);
        self.next_id += 1;
        log::debug!("registered kernel {} as {}", metadata.name, id);

        let name = metadata.name.clone();
        self.kernels.insert(
            name,
            RegisteredKernel {
                id,
                metadata: Arc::new(metadata),
                kernel,
            },
        );
        Ok(id)
    }

    /// Look up a kernel by name.
    pub fn lookup(&self, name: &str) -> RegistryResult<&RegisteredKernel> {
        self.kernels
            .get(name)
            .ok_or_else(|| RegistryError::KernelNotFound {
                name: name.to_string(),
            })
    }

    /// Get metadata for a kernel.
    pub fn get_metadata(&self, name: &str) -> Option<&KernelMetadata> {
        self.kernels.get(name).map(|e| e.metadata.as_ref())
    }

    /// Check if a kernel is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    /// All registered names in sorted order.
    ///
    /// The iterator is `Clone`, so it can be restarted from any point.
    pub fn list(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.kernels.keys().map(String::as_str)
    }

    /// All registered kernels in name order.
    pub fn kernels(&self) -> impl Iterator<Item = &RegisteredKernel> {
        self.kernels.values()
    }

    /// Number of parameters a kernel takes.
    pub fn parameter_count(&self, name: &str) -> RegistryResult<usize> {
        self.lookup(name).map(|e| e.metadata.parameter_count())
    }

    /// Search kernels by name, description or tag.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();

        self.kernels
            .iter()
            .filter(|(_, entry)| {
                let name_match = entry.metadata.name.to_lowercase().contains(&query);
                let desc_match = entry.metadata.description.to_lowercase().contains(&query);
                let tag_match = entry
                    .metadata
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase().contains(&query));

                name_match || desc_match || tag_match
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Unregister a kernel.
    ///
    /// Nodes already bound to it keep their own handle.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.kernels.remove(name).is_some()
    }

    /// Get the total number of registered kernels.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}
