//! Neighbourhood filters.

use super::add;
use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::data::ImageBuffer;
use crate::core::error::{KernelError, KernelResult, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::{ImageFormat, TypeConstraint};
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Register filter kernels.
pub fn register(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    add(registry, target, Box3x3)
}

/// 3x3 mean filter on a U8 image.
///
/// Border pixels replicate the nearest edge.
#[derive(Debug, Clone)]
pub struct Box3x3;

impl Kernel for Box3x3 {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.openvx.box3x3")
            .description("3x3 box blur of a U8 image")
            .input("input", TypeConstraint::Image(ImageFormat::U8))
            .output("output", TypeConstraint::Image(ImageFormat::U8))
            .tags(["filter", "blur"])
            .build()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        ctx.require_same_dimensions(0, 1)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let (src, dst) = ctx.unary_image(0, 1)?;
        let gray = src
            .to_gray_image()
            .ok_or_else(|| KernelError::invalid_parameters("input is not a U8 image"))?;
        let blurred = imageproc::filter::box_filter(&gray, 1, 1);
        let blurred = ImageBuffer::from(&blurred);
        if blurred.data.len() != dst.data.len() {
            return Err(KernelError::failure("image sizes differ"));
        }
        dst.data.copy_from_slice(&blurred.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::core::error::VerifyError;
    use crate::core::types::ImageFormat;
    use crate::graph::Graph;

    #[test]
    fn test_box3x3_uniform_image() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(5, 4, ImageFormat::U8).unwrap();
        let output = graph.create_virtual();
        graph.write_image(input, &[40; 20]).unwrap();
        graph.add_node("org.khronos.openvx.box3x3", &[input, output]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();
        assert_eq!(graph.read_image(output).unwrap(), vec![40; 20]);
    }

    #[test]
    fn test_box3x3_size_mismatch() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(5, 4, ImageFormat::U8).unwrap();
        let output = graph.create_image(4, 4, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.openvx.box3x3", &[input, output]).unwrap();
        assert!(matches!(
            graph.verify(),
            Err(VerifyError::InvalidParameters { .. })
        ));
    }
}
