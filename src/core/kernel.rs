//! Kernel trait and kernel metadata.
//!
//! A kernel is the unit of processing a node binds to data. It uses a
//! two-phase design: checks that run once during verification
//! (`output_descriptor`, `validate`, `initialize`) and the `execute` call that
//! runs every time the graph is processed.

use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::KernelResult;
use crate::core::types::{DataDesc, Direction, TypeConstraint};
use serde::{Deserialize, Serialize};

/// Definition of one parameter slot of a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Slot name, used in diagnostics.
    pub name: String,
    /// Whether the kernel reads, writes, or both.
    pub direction: Direction,
    /// Accepted data.
    pub constraint: TypeConstraint,
    /// Optional description.
    pub description: Option<String>,
}

impl ParameterDefinition {
    /// Create a slot with an explicit direction.
    pub fn new(name: impl Into<String>, direction: Direction, constraint: TypeConstraint) -> Self {
        Self {
            name: name.into(),
            direction,
            constraint,
            description: None,
        }
    }

    /// Create an input slot.
    pub fn input(name: impl Into<String>, constraint: TypeConstraint) -> Self {
        Self::new(name, Direction::Input, constraint)
    }

    /// Create an output slot.
    pub fn output(name: impl Into<String>, constraint: TypeConstraint) -> Self {
        Self::new(name, Direction::Output, constraint)
    }

    /// Create a slot that is both read and written.
    pub fn bidirectional(name: impl Into<String>, constraint: TypeConstraint) -> Self {
        Self::new(name, Direction::Bidirectional, constraint)
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Metadata describing a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelMetadata {
    /// Unique dotted name (e.g., "org.khronos.copy_image").
    pub name: String,
    /// Detailed description.
    pub description: String,
    /// Ordered parameter slots.
    pub parameters: Vec<ParameterDefinition>,
    /// Searchable tags.
    pub tags: Vec<String>,
}

impl KernelMetadata {
    /// Create a new metadata builder.
    pub fn builder(name: impl Into<String>) -> KernelMetadataBuilder {
        KernelMetadataBuilder::new(name)
    }

    /// Number of parameter slots.
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Slot definition by index.
    pub fn parameter(&self, index: usize) -> Option<&ParameterDefinition> {
        self.parameters.get(index)
    }

    /// Indices of slots the kernel writes.
    pub fn output_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction.writes())
            .map(|(i, _)| i)
    }
}

/// Builder for KernelMetadata.
pub struct KernelMetadataBuilder {
    name: String,
    description: String,
    parameters: Vec<ParameterDefinition>,
    tags: Vec<String>,
}

impl KernelMetadataBuilder {
    /// Create a new builder with the kernel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a parameter slot.
    pub fn parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Append an input slot.
    pub fn input(self, name: impl Into<String>, constraint: TypeConstraint) -> Self {
        self.parameter(ParameterDefinition::input(name, constraint))
    }

    /// Append an output slot.
    pub fn output(self, name: impl Into<String>, constraint: TypeConstraint) -> Self {
        self.parameter(ParameterDefinition::output(name, constraint))
    }

    /// Append a bidirectional slot.
    pub fn bidirectional(self, name: impl Into<String>, constraint: TypeConstraint) -> Self {
        self.parameter(ParameterDefinition::bidirectional(name, constraint))
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add multiple tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    /// Build the metadata.
    pub fn build(self) -> KernelMetadata {
        KernelMetadata {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            tags: self.tags,
        }
    }
}

/// The core trait for kernels.
///
/// # Design
///
/// Verification calls, in order:
///
/// 1. `output_descriptor` for every virtual output, once all inputs of the
///    node are resolved.
/// 2. `validate` for cross-parameter checks the slot constraints cannot
///    express, such as equal input dimensions.
/// 3. `initialize` once the plan is built.
///
/// Processing then calls `execute` once per run.
///
/// # Thread Safety
///
/// `Send + Sync` bounds let independent nodes run on different threads.
///
/// # Example Implementation
///
/// ```ignore
/// struct Invert;
///
/// impl Kernel for Invert {
///     fn metadata(&self) -> KernelMetadata {
///         KernelMetadata::builder("com.example.invert")
///             .input("input", TypeConstraint::Image(ImageFormat::U8))
///             .output("output", TypeConstraint::Image(ImageFormat::U8))
///             .build()
///     }
///
///     fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
///         let (src, dst) = ctx.unary_image(0, 1)?;
///         for (d, s) in dst.data.iter_mut().zip(&src.data) {
///             *d = !*s;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Kernel: Send + Sync {
    /// Get the metadata for this kernel.
    ///
    /// Called once during registration; the result is cached.
    fn metadata(&self) -> KernelMetadata;

    /// Infer the descriptor of the output slot `index`.
    ///
    /// Called only when every input of the node has a descriptor. Returning
    /// `None` means the output cannot be inferred and verification fails.
    ///
    /// The default copies the first input image for `AnyImage` outputs, keeps
    /// the first input's dimensions for fixed-format outputs, and derives
    /// scalar and array outputs from their constraint or first matching input.
    fn output_descriptor(&self, index: usize, ctx: &ValidationContext) -> Option<DataDesc> {
        default_output_descriptor(index, ctx)
    }

    /// Check parameters beyond their slot constraints.
    fn validate(&self, _ctx: &ValidationContext) -> KernelResult<()> {
        Ok(())
    }

    /// Prepare for execution once the plan is fixed.
    fn initialize(&self, _ctx: &ValidationContext) -> KernelResult<()> {
        Ok(())
    }

    /// Execute the kernel on bound data.
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()>;
}

/// Output inference used by [`Kernel::output_descriptor`] unless overridden.
pub fn default_output_descriptor(index: usize, ctx: &ValidationContext) -> Option<DataDesc> {
    let slot = ctx.parameter(index)?;
    match &slot.constraint {
        TypeConstraint::AnyImage => ctx.first_input_image(),
        TypeConstraint::Image(format) => {
            let (width, height) = ctx.first_input_image()?.dimensions()?;
            Some(DataDesc::image(width, height, *format))
        }
        TypeConstraint::ImageOneOf(formats) => ctx
            .first_input_image()
            .filter(|desc| desc.image_format().map_or(false, |f| formats.contains(&f))),
        TypeConstraint::Scalar(ty) => Some(DataDesc::scalar(*ty)),
        TypeConstraint::AnyScalar => None,
        TypeConstraint::Array(item) => ctx.inputs().find_map(|(_, desc)| match desc {
            DataDesc::Array { item: found, .. } if found == *item => Some(desc),
            _ => None,
        }),
        TypeConstraint::AnyArray => ctx
            .inputs()
            .map(|(_, desc)| desc)
            .find(|desc| matches!(desc, DataDesc::Array { .. })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::types::{ImageFormat, ScalarType};
    use std::sync::Arc;

    fn metadata() -> KernelMetadata {
        KernelMetadata::builder("org.example.blend")
            .description("Blend two images")
            .input("a", TypeConstraint::AnyImage)
            .input("b", TypeConstraint::AnyImage)
            .output("out", TypeConstraint::Image(ImageFormat::S16))
            .output("count", TypeConstraint::Scalar(ScalarType::U32))
            .tags(["test", "blend"])
            .build()
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = metadata();
        assert_eq!(metadata.name, "org.example.blend");
        assert_eq!(metadata.parameter_count(), 4);
        assert_eq!(metadata.output_indices().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(metadata.tags.len(), 2);
    }

    #[test]
    fn test_default_output_descriptor() {
        let metadata = Arc::new(metadata());
        let input = DataDesc::image(32, 16, ImageFormat::U8);
        let ctx = ValidationContext::new(
            NodeId(0),
            metadata,
            vec![Some(input), Some(input), None, None],
            vec![None; 4],
        );

        assert_eq!(
            default_output_descriptor(2, &ctx),
            Some(DataDesc::image(32, 16, ImageFormat::S16))
        );
        assert_eq!(
            default_output_descriptor(3, &ctx),
            Some(DataDesc::scalar(ScalarType::U32))
        );
        assert_eq!(default_output_descriptor(9, &ctx), None);
    }
}
