//! The context: kernel registry, targets and execution defaults.
//!
//! A [`Context`] is built once and shared by every graph created from it
//! through an `Arc`. Graphs look kernels up by name in the context at node
//! construction and ask its assignment policy for a target at verification.

use crate::config::Config;
use crate::core::error::{KernelId, RegistryError, RegistryResult};
use crate::core::kernel::Kernel;
use crate::execution::engine::ExecutionOptions;
use crate::kernels::builtin::{self, DEFAULT_TARGET};
use crate::kernels::registry::{KernelRegistry, RegisteredKernel};
use crate::kernels::target::{AssignmentPolicy, Target, TargetPolicy};
use std::fmt;
use std::sync::Arc;

/// Registry, targets and scheduling defaults shared by graphs.
pub struct Context {
    registry: KernelRegistry,
    targets: Vec<Target>,
    policy: Arc<dyn AssignmentPolicy>,
    options: ExecutionOptions,
}

impl Context {
    /// Create a context with the built-in kernels on the default target.
    ///
    /// # Panics
    ///
    /// Panics if the built-in kernels collide with each other, which would be
    /// a bug in this crate.
    pub fn new() -> Self {
        ContextBuilder::new()
            .build()
            .expect("built-in kernels have unique names")
    }

    /// Create a default context ready to share between graphs.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Start building a customised context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Create a default context using the settings of a configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut context = Self::new();
        context.policy = Arc::new(config.policy());
        context.options = config.execution_options();
        context
    }

    /// The kernel registry.
    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    /// Look up a kernel by name.
    pub fn lookup(&self, name: &str) -> RegistryResult<&RegisteredKernel> {
        self.registry.lookup(name)
    }

    /// Register a kernel and host it on the default target.
    pub fn register<K>(&mut self, kernel: K) -> RegistryResult<KernelId>
    where
        K: Kernel + 'static,
    {
        let name = kernel.metadata().name;
        let id = self.registry.register(kernel)?;
        match self.targets.first_mut() {
            Some(target) => target.add_kernel(name),
            None => self.targets.push(Target::new(DEFAULT_TARGET).with_kernel(name)),
        }
        Ok(id)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// All targets, in index order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Names of the kernels hosted by the target at `index`, sorted.
    pub fn kernels_for_target(
        &self,
        index: usize,
    ) -> Option<impl Iterator<Item = &str> + Clone + '_> {
        self.targets.get(index).map(Target::kernels)
    }

    /// Number of parameters a kernel takes.
    pub fn kernel_parameter_count(&self, name: &str) -> RegistryResult<usize> {
        self.registry.parameter_count(name)
    }

    /// Index of the target with the given name.
    pub fn target_index(&self, name: &str) -> RegistryResult<usize> {
        self.targets
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| RegistryError::TargetNotFound {
                name: name.to_string(),
            })
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Pick a target for a kernel using the context policy.
    pub fn assign(&self, kernel: &str) -> Option<usize> {
        self.policy.assign(kernel, &self.targets)
    }

    /// The active assignment policy.
    pub fn policy(&self) -> &dyn AssignmentPolicy {
        self.policy.as_ref()
    }

    /// Default options for graph execution.
    pub fn execution_options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Replace the default execution options.
    pub fn set_execution_options(&mut self, options: ExecutionOptions) {
        self.options = options;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("kernels", &self.registry.len())
            .field("targets", &self.targets.iter().map(Target::name).collect::<Vec<_>>())
            .field("policy", &self.policy.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for a [`Context`] with custom kernels and targets.
///
/// The default target always comes first, so the lowest-index policy
/// prefers it for the built-in kernels.
pub struct ContextBuilder {
    include_builtins: bool,
    kernels: Vec<(Arc<dyn Kernel>, Option<String>)>,
    targets: Vec<Target>,
    policy: Arc<dyn AssignmentPolicy>,
    options: ExecutionOptions,
}

impl ContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            include_builtins: true,
            kernels: Vec::new(),
            targets: Vec::new(),
            policy: Arc::new(TargetPolicy::default()),
            options: ExecutionOptions::default(),
        }
    }

    /// Include or exclude built-in kernels.
    pub fn with_builtins(mut self, include: bool) -> Self {
        self.include_builtins = include;
        self
    }

    /// Register a custom kernel on the default target.
    pub fn register<K>(mut self, kernel: K) -> Self
    where
        K: Kernel + 'static,
    {
        self.kernels.push((Arc::new(kernel), None));
        self
    }

    /// Register a custom kernel on a named target added with [`Self::target`].
    pub fn register_on<K>(mut self, kernel: K, target: impl Into<String>) -> Self
    where
        K: Kernel + 'static,
    {
        self.kernels.push((Arc::new(kernel), Some(target.into())));
        self
    }

    /// Add a target after the default one.
    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Set the assignment policy.
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: AssignmentPolicy + 'static,
    {
        self.policy = Arc::new(policy);
        self
    }

    /// Set the default execution options.
    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the context.
    pub fn build(self) -> RegistryResult<Context> {
        let mut registry = KernelRegistry::new();
        let mut default_target = Target::new(DEFAULT_TARGET);
        if self.include_builtins {
            builtin::register_all(&mut registry, &mut default_target)?;
        }

        let mut targets = vec![default_target];
        for target in self.targets {
            if targets.iter().any(|t| t.name() == target.name()) {
                return Err(RegistryError::DuplicateTarget {
                    name: target.name().to_string(),
                });
            }
            targets.push(target);
        }

        for (kernel, target_name) in self.kernels {
            let index = match &target_name {
                Some(name) => targets
                    .iter()
                    .position(|t| t.name() == name)
                    .ok_or_else(|| RegistryError::TargetNotFound { name: name.clone() })?,
                None => 0,
            };
            let name = kernel.metadata().name;
            registry.register_arc(kernel)?;
            targets[index].add_kernel(name);
        }

        log::debug!(
            "built context with {} kernels on {} targets",
            registry.len(),
            targets.len()
        );
        Ok(Context {
            registry,
            targets,
            policy: self.policy,
            options: self.options,
        })
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ExecutionContext;
    use crate::core::error::KernelResult;
    use crate::core::kernel::KernelMetadata;
    use crate::core::types::TypeConstraint;

    struct Passthrough;

    impl Kernel for Passthrough {
        fn metadata(&self) -> KernelMetadata {
            KernelMetadata::builder("org.example.passthrough")
                .input("in", TypeConstraint::AnyImage)
                .output("out", TypeConstraint::AnyImage)
                .build()
        }

        fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_context_introspection() {
        let context = Context::new();
        assert_eq!(context.targets().len(), 1);
        assert_eq!(context.targets()[0].name(), DEFAULT_TARGET);

        let hosted: Vec<_> = context.kernels_for_target(0).unwrap().collect();
        assert_eq!(hosted.len(), context.registry().len());
        assert!(context.kernels_for_target(1).is_none());

        assert_eq!(context.kernel_parameter_count("org.khronos.copy_image").unwrap(), 2);
        assert_eq!(context.kernel_parameter_count("org.khronos.openvx.add").unwrap(), 4);
        assert!(matches!(
            context.kernel_parameter_count("org.khronos.nothing"),
            Err(RegistryError::KernelNotFound { .. })
        ));
    }

    #[test]
    fn test_new_registers_every_builtin() {
        let context = Context::new();
        let mut registry = KernelRegistry::new();
        let mut target = Target::new(DEFAULT_TARGET);
        builtin::register_all(&mut registry, &mut target).unwrap();

        assert_eq!(context.registry().len(), 12);
        assert!(context.registry().list().eq(registry.list()));
        assert!(context.kernels_for_target(0).unwrap().eq(target.kernels()));
        assert_eq!(context.policy().name(), TargetPolicy::default().name());
    }

    #[test]
    fn test_register_duplicate_kernel() {
        let mut context = Context::new();
        context.register(Passthrough).unwrap();
        assert!(context.targets()[0].supports("org.example.passthrough"));
        assert!(matches!(
            context.register(Passthrough),
            Err(RegistryError::DuplicateKernel { .. })
        ));
    }

    #[test]
    fn test_builder_custom_target() {
        let context = Context::builder()
            .with_builtins(false)
            .target(Target::new("example.fast"))
            .register_on(Passthrough, "example.fast")
            .policy(TargetPolicy::Named("example.fast".to_string()))
            .build()
            .unwrap();

        assert_eq!(context.registry().len(), 1);
        assert_eq!(context.target_index("example.fast").unwrap(), 1);
        assert_eq!(context.assign("org.example.passthrough"), Some(1));
        assert_eq!(context.policy().name(), "named");
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_toml_str(
            "[execution]\nparallel = true\nmax_threads = 3\n[scheduler]\npolicy = \"lowest_index\"\n",
        )
        .unwrap();
        let context = Context::from_config(&config);
        assert!(context.execution_options().parallel);
        assert_eq!(context.execution_options().max_threads, 3);
        assert_eq!(context.policy().name(), "lowest_index");
        assert_eq!(context.assign("org.khronos.copy_image"), Some(0));
    }

    #[test]
    fn test_builder_rejects_unknown_and_duplicate_targets() {
        let result = Context::builder()
            .register_on(Passthrough, "nowhere")
            .build();
        assert!(matches!(result, Err(RegistryError::TargetNotFound { .. })));

        let result = Context::builder()
            .target(Target::new(DEFAULT_TARGET))
            .build();
        assert!(matches!(result, Err(RegistryError::DuplicateTarget { .. })));
    }
}
