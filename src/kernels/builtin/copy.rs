//! Copy kernels: image and array duplication.

use super::add;
use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::{KernelError, KernelResult, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::{DataDesc, TypeConstraint};
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Register copy kernels.
pub fn register(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    add(registry, target, CopyImage)?;
    add(registry, target, CopyArray)
}

/// Copies an image into an image of identical shape.
#[derive(Debug, Clone)]
pub struct CopyImage;

impl Kernel for CopyImage {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.copy_image")
            .description("Copy an image into another image of the same size and format")
            .input("input", TypeConstraint::AnyImage)
            .output("output", TypeConstraint::AnyImage)
            .tags(["copy", "image"])
            .build()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        ctx.require_same_dimensions(0, 1)?;
        let (input, output) = (ctx.format(0)?, ctx.format(1)?);
        if input != output {
            return Err(KernelError::invalid_parameters(format!(
                "cannot copy {} into {}",
                input, output
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let (src, dst) = ctx.unary_image(0, 1)?;
        if src.data.len() != dst.data.len() {
            return Err(KernelError::failure("image sizes differ"));
        }
        dst.data.copy_from_slice(&src.data);
        Ok(())
    }
}

/// Copies array items into an array of the same item type.
#[derive(Debug, Clone)]
pub struct CopyArray;

impl Kernel for CopyArray {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.debug.copy_array")
            .description("Copy the items of an array into another array")
            .input("input", TypeConstraint::AnyArray)
            .output("output", TypeConstraint::AnyArray)
            .tags(["copy", "array", "debug"])
            .build()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        match (ctx.desc(0), ctx.desc(1)) {
            (Some(DataDesc::Array { item: a, .. }), Some(DataDesc::Array { item: b, .. }))
                if a == b =>
            {
                Ok(())
            }
            _ => Err(KernelError::invalid_parameters(
                "arrays must share an item type",
            )),
        }
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let items = ctx.array(0)?.items.clone();
        let dst = ctx.array_mut(1)?;
        dst.set_items(&items).map_err(|found| {
            KernelError::invalid_parameters(format!(
                "item type {} does not fit array of {}",
                found, dst.item
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::core::error::VerifyError;
    use crate::core::types::{DataDesc, ImageFormat, ScalarType, ScalarValue};
    use crate::graph::Graph;

    #[test]
    fn test_copy_image_into_virtual() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(4, 2, ImageFormat::U8).unwrap();
        let output = graph.create_virtual();
        let pixels: Vec<u8> = (0..8).collect();
        graph.write_image(input, &pixels).unwrap();

        graph.add_node("org.khronos.copy_image", &[input, output]).unwrap();
        graph.verify().unwrap();
        assert_eq!(
            graph.data_desc(output).unwrap(),
            Some(DataDesc::image(4, 2, ImageFormat::U8))
        );

        graph.process().unwrap();
        assert_eq!(graph.read_image(output).unwrap(), pixels);
    }

    #[test]
    fn test_copy_image_rejects_format_change() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(4, 2, ImageFormat::U8).unwrap();
        let output = graph.create_image(4, 2, ImageFormat::Y800).unwrap();
        graph.add_node("org.khronos.copy_image", &[input, output]).unwrap();

        assert!(matches!(
            graph.verify(),
            Err(VerifyError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_copy_array() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_array(ScalarType::U8, 4).unwrap();
        let output = graph.create_array(ScalarType::U8, 2).unwrap();
        let items = [ScalarValue::U8(1), ScalarValue::U8(2), ScalarValue::U8(3)];
        graph.write_array(input, &items).unwrap();

        graph.add_node("org.khronos.debug.copy_array", &[input, output]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();

        assert_eq!(
            graph.read_array(output).unwrap(),
            vec![ScalarValue::U8(1), ScalarValue::U8(2)]
        );
    }
}
