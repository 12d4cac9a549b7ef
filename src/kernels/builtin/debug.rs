//! Debug kernels: fill an image with a pattern and check it back.

use super::add;
use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::{KernelError, KernelResult, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::{DataDesc, ScalarType, ScalarValue, TypeConstraint};
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Register debug kernels.
pub fn register(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    add(registry, target, FillImage)?;
    add(registry, target, CheckImage)
}

fn pattern(ctx: &ExecutionContext<'_>, index: usize) -> KernelResult<[u8; 4]> {
    let value = ctx.scalar(index)?.as_u32().ok_or_else(|| {
        KernelError::invalid_parameters(format!("parameter {} must be a u32 scalar", index))
    })?;
    Ok(value.to_ne_bytes())
}

/// Fills every pixel with the bytes of a packed 32-bit value.
///
/// Each pixel receives the first `bytes_per_pixel` bytes of the value in
/// memory order. The output shape cannot be inferred, so a virtual output must
/// be pinned with a full descriptor.
#[derive(Debug, Clone)]
pub struct FillImage;

impl Kernel for FillImage {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.debug.fill_image")
            .description("Fill an image with a packed pixel value")
            .input("value", TypeConstraint::Scalar(ScalarType::U32))
            .output("output", TypeConstraint::AnyImage)
            .tags(["debug", "fill"])
            .build()
    }

    fn output_descriptor(&self, _index: usize, _ctx: &ValidationContext) -> Option<DataDesc> {
        None
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let bytes = pattern(ctx, 0)?;
        let image = ctx.image_mut(1)?;
        let bpp = image.format.bytes_per_pixel();
        for pixel in image.data.chunks_exact_mut(bpp) {
            pixel.copy_from_slice(&bytes[..bpp]);
        }
        Ok(())
    }
}

/// Counts bytes of an image that differ from a packed 32-bit value.
///
/// The mismatch count is written to the output scalar; any mismatch makes
/// the kernel fail with code [`CheckImage::MISMATCH`].
#[derive(Debug, Clone)]
pub struct CheckImage;

impl CheckImage {
    /// Error code reported when the image does not match.
    pub const MISMATCH: i32 = 1;
}

impl Kernel for CheckImage {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.debug.check_image")
            .description("Compare every pixel of an image against a packed value")
            .input("input", TypeConstraint::AnyImage)
            .input("value", TypeConstraint::Scalar(ScalarType::U32))
            .output("errors", TypeConstraint::Scalar(ScalarType::U32))
            .tags(["debug", "check"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let bytes = pattern(ctx, 1)?;
        let image = ctx.image(0)?;
        let bpp = image.format.bytes_per_pixel();
        let errors = image
            .data
            .chunks_exact(bpp)
            .flat_map(|pixel| pixel.iter().zip(&bytes[..bpp]))
            .filter(|(have, want)| have != want)
            .count() as u32;
        let total = image.data.len();

        ctx.set_scalar(2, ScalarValue::U32(errors))?;
        if errors > 0 {
            return Err(KernelError::new(
                Self::MISMATCH,
                format!(
                    "{} of {} bytes differ from 0x{:08x}",
                    errors,
                    total,
                    u32::from_ne_bytes(bytes)
                ),
            ));
        }
        Ok(())
    }
}
