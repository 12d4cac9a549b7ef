//! Bitwise kernels on U8 images.

use super::add;
use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::{KernelError, KernelResult, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::{ImageFormat, TypeConstraint};
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Register bitwise kernels.
pub fn register(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    add(registry, target, And)?;
    add(registry, target, Or)?;
    add(registry, target, Xor)?;
    add(registry, target, Not)
}

fn binary_metadata(name: &str, description: &str) -> KernelMetadata {
    KernelMetadata::builder(name)
        .description(description)
        .input("in1", TypeConstraint::Image(ImageFormat::U8))
        .input("in2", TypeConstraint::Image(ImageFormat::U8))
        .output("out", TypeConstraint::Image(ImageFormat::U8))
        .tag("bitwise")
        .build()
}

fn validate_binary(ctx: &ValidationContext) -> KernelResult<()> {
    ctx.require_same_dimensions(0, 1)?;
    ctx.require_same_dimensions(0, 2)
}

fn apply_binary(ctx: &mut ExecutionContext<'_>, op: impl Fn(u8, u8) -> u8) -> KernelResult<()> {
    let (a, b, out) = ctx.binary_image(0, 1, 2)?;
    if a.data.len() != out.data.len() || b.data.len() != out.data.len() {
        return Err(KernelError::failure("image sizes differ"));
    }
    for ((o, x), y) in out.data.iter_mut().zip(&a.data).zip(&b.data) {
        *o = op(*x, *y);
    }
    Ok(())
}

/// Bitwise AND of two images.
#[derive(Debug, Clone)]
pub struct And;

impl Kernel for And {
    fn metadata(&self) -> KernelMetadata {
        binary_metadata("org.khronos.openvx.and", "Bitwise AND of two U8 images")
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        validate_binary(ctx)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        apply_binary(ctx, |a, b| a & b)
    }
}

/// Bitwise OR of two images.
#[derive(Debug, Clone)]
pub struct Or;

impl Kernel for Or {
    fn metadata(&self) -> KernelMetadata {
        binary_metadata("org.khronos.openvx.or", "Bitwise OR of two U8 images")
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        validate_binary(ctx)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        apply_binary(ctx, |a, b| a | b)
    }
}

/// Bitwise XOR of two images.
#[derive(Debug, Clone)]
pub struct Xor;

impl Kernel for Xor {
    fn metadata(&self) -> KernelMetadata {
        binary_metadata("org.khronos.openvx.xor", "Bitwise XOR of two U8 images")
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        validate_binary(ctx)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        apply_binary(ctx, |a, b| a ^ b)
    }
}

/// Bitwise NOT of one image.
#[derive(Debug, Clone)]
pub struct Not;

impl Kernel for Not {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.openvx.not")
            .description("Bitwise NOT of a U8 image")
            .input("input", TypeConstraint::Image(ImageFormat::U8))
            .output("output", TypeConstraint::Image(ImageFormat::U8))
            .tag("bitwise")
            .build()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        ctx.require_same_dimensions(0, 1)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let (src, dst) = ctx.unary_image(0, 1)?;
        for (d, s) in dst.data.iter_mut().zip(&src.data) {
            *d = !*s;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::core::error::NodeError;
    use crate::core::types::ImageFormat;
    use crate::graph::Graph;

    fn run_binary(kernel: &str, a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut graph = Graph::new(Context::new_shared());
        let in1 = graph.create_image(a.len() as u32, 1, ImageFormat::U8).unwrap();
        let in2 = graph.create_image(b.len() as u32, 1, ImageFormat::U8).unwrap();
        let out = graph.create_virtual();
        graph.write_image(in1, a).unwrap();
        graph.write_image(in2, b).unwrap();
        graph.add_node(kernel, &[in1, in2, out]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();
        graph.read_image(out).unwrap()
    }

    #[test]
    fn test_binary_ops() {
        let a = [0b1100, 0xFF];
        let b = [0b1010, 0x0F];
        assert_eq!(run_binary("org.khronos.openvx.and", &a, &b), vec![0b1000, 0x0F]);
        assert_eq!(run_binary("org.khronos.openvx.or", &a, &b), vec![0b1110, 0xFF]);
        assert_eq!(run_binary("org.khronos.openvx.xor", &a, &b), vec![0b0110, 0xF0]);
    }

    #[test]
    fn test_not_chain() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(2, 1, ImageFormat::U8).unwrap();
        let middle = graph.create_virtual();
        let output = graph.create_virtual();
        graph.write_image(input, &[0x0F, 0x00]).unwrap();
        graph.add_node("org.khronos.openvx.not", &[middle, output]).unwrap();
        graph.add_node("org.khronos.openvx.not", &[input, middle]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();
        assert_eq!(graph.read_image(output).unwrap(), vec![0x0F, 0x00]);
    }

    #[test]
    fn test_not_rejects_s16_image() {
        let mut graph = Graph::new(Context::new_shared());
        let input = graph.create_image(2, 1, ImageFormat::S16).unwrap();
        let output = graph.create_virtual();
        let err = graph
            .add_node("org.khronos.openvx.not", &[input, output])
            .unwrap_err();
        assert!(matches!(err, NodeError::ParameterTypeMismatch { index: 0, .. }));
        assert_eq!(graph.node_count(), 0);
    }
}
