//! Per-pixel arithmetic kernels: absolute difference, add and subtract.

use super::add;
use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::data::ImageBuffer;
use crate::core::error::{KernelError, KernelResult, RegistryResult};
use crate::core::kernel::{Kernel, KernelMetadata};
use crate::core::types::{DataDesc, ImageFormat, ScalarType, ScalarValue, TypeConstraint};
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Register arithmetic kernels.
pub fn register(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    add(registry, target, AbsDiff)?;
    add(registry, target, Add)?;
    add(registry, target, Subtract)
}

fn u8_or_s16() -> TypeConstraint {
    TypeConstraint::ImageOneOf(vec![ImageFormat::U8, ImageFormat::S16])
}

/// Overflow handling for add and subtract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertPolicy {
    /// Keep the low bits of the result.
    Wrap,
    /// Clamp the result to the output range.
    Saturate,
}

impl ConvertPolicy {
    /// Scalar encoding of [`ConvertPolicy::Wrap`].
    pub const WRAP: i32 = 0;
    /// Scalar encoding of [`ConvertPolicy::Saturate`].
    pub const SATURATE: i32 = 1;

    /// Decode a policy scalar.
    pub fn from_value(value: ScalarValue) -> KernelResult<Self> {
        match value.as_i32() {
            Some(Self::WRAP) => Ok(ConvertPolicy::Wrap),
            Some(Self::SATURATE) => Ok(ConvertPolicy::Saturate),
            _ => Err(KernelError::invalid_parameters(format!(
                "unknown overflow policy {:?}",
                value
            ))),
        }
    }

    /// Scalar encoding of this policy.
    pub fn to_value(self) -> ScalarValue {
        match self {
            ConvertPolicy::Wrap => ScalarValue::Enum(Self::WRAP),
            ConvertPolicy::Saturate => ScalarValue::Enum(Self::SATURATE),
        }
    }

    fn apply(self, value: i64, format: ImageFormat) -> i64 {
        match self {
            ConvertPolicy::Wrap => value,
            ConvertPolicy::Saturate => saturate(value, format),
        }
    }
}

fn saturate(value: i64, format: ImageFormat) -> i64 {
    match format {
        ImageFormat::S16 => value.clamp(i64::from(i16::MIN), i64::from(i16::MAX)),
        ImageFormat::U16 => value.clamp(0, i64::from(u16::MAX)),
        ImageFormat::S32 => value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)),
        ImageFormat::U32 => value.clamp(0, i64::from(u32::MAX)),
        _ => value.clamp(0, i64::from(u8::MAX)),
    }
}

fn check_same_size(a: &ImageBuffer, b: &ImageBuffer, out: &ImageBuffer) -> KernelResult<()> {
    if a.pixel_count() != b.pixel_count() || a.pixel_count() != out.pixel_count() {
        return Err(KernelError::failure("image sizes differ"));
    }
    Ok(())
}

/// Shared checks of the two-input arithmetic kernels.
///
/// All three images must have equal dimensions, and a U8 output requires two
/// U8 inputs.
fn validate_binary(ctx: &ValidationContext, output: usize) -> KernelResult<()> {
    ctx.require_same_dimensions(0, 1)?;
    ctx.require_same_dimensions(0, output)?;
    let out = ctx.format(output)?;
    if out == ImageFormat::U8 && (ctx.format(0)? != ImageFormat::U8 || ctx.format(1)? != ImageFormat::U8) {
        return Err(KernelError::invalid_parameters(
            "a U8 output requires U8 inputs",
        ));
    }
    Ok(())
}

/// Output descriptor of the two-input arithmetic kernels: S16 unless both
/// inputs are U8.
fn binary_output(ctx: &ValidationContext) -> Option<DataDesc> {
    let (width, height) = ctx.desc(0)?.dimensions()?;
    let both_u8 = ctx.format(0).ok()? == ImageFormat::U8 && ctx.format(1).ok()? == ImageFormat::U8;
    let format = if both_u8 { ImageFormat::U8 } else { ImageFormat::S16 };
    Some(DataDesc::image(width, height, format))
}

/// Computes `|a - b|` per pixel.
#[derive(Debug, Clone)]
pub struct AbsDiff;

impl Kernel for AbsDiff {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.openvx.absdiff")
            .description("Absolute difference of two images")
            .input("in1", u8_or_s16())
            .input("in2", u8_or_s16())
            .output("out", u8_or_s16())
            .tags(["arithmetic", "difference"])
            .build()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        ctx.require_same_dimensions(0, 1)?;
        ctx.require_same_dimensions(0, 2)?;
        let (a, b, out) = (ctx.format(0)?, ctx.format(1)?, ctx.format(2)?);
        if a != b || a != out {
            return Err(KernelError::invalid_parameters(format!(
                "absdiff needs matching formats, got {}, {} and {}",
                a, b, out
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let (a, b, out) = ctx.binary_image(0, 1, 2)?;
        check_same_size(a, b, out)?;
        for i in 0..out.pixel_count() {
            let value = (a.sample(i) - b.sample(i)).abs();
            out.store(i, saturate(value, out.format));
        }
        Ok(())
    }
}

/// Adds two images with a wrap or saturate overflow policy.
#[derive(Debug, Clone)]
pub struct Add;

impl Kernel for Add {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.openvx.add")
            .description("Per-pixel sum of two images")
            .input("in1", u8_or_s16())
            .input("in2", u8_or_s16())
            .input("policy", TypeConstraint::Scalar(ScalarType::Enum))
            .output("out", u8_or_s16())
            .tags(["arithmetic"])
            .build()
    }

    fn output_descriptor(&self, index: usize, ctx: &ValidationContext) -> Option<DataDesc> {
        (index == 3).then(|| binary_output(ctx)).flatten()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        if let Some(policy) = ctx.scalar_value(2) {
            ConvertPolicy::from_value(policy)?;
        }
        validate_binary(ctx, 3)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let policy = ConvertPolicy::from_value(ctx.scalar(2)?)?;
        let (a, b, out) = ctx.binary_image(0, 1, 3)?;
        check_same_size(a, b, out)?;
        for i in 0..out.pixel_count() {
            let value = a.sample(i) + b.sample(i);
            out.store(i, policy.apply(value, out.format));
        }
        Ok(())
    }
}

/// Subtracts the second image from the first with an overflow policy.
#[derive(Debug, Clone)]
pub struct Subtract;

impl Kernel for Subtract {
    fn metadata(&self) -> KernelMetadata {
        KernelMetadata::builder("org.khronos.openvx.subtract")
            .description("Per-pixel difference of two images")
            .input("in1", u8_or_s16())
            .input("in2", u8_or_s16())
            .input("policy", TypeConstraint::Scalar(ScalarType::Enum))
            .output("out", u8_or_s16())
            .tags(["arithmetic"])
            .build()
    }

    fn output_descriptor(&self, index: usize, ctx: &ValidationContext) -> Option<DataDesc> {
        (index == 3).then(|| binary_output(ctx)).flatten()
    }

    fn validate(&self, ctx: &ValidationContext) -> KernelResult<()> {
        if let Some(policy) = ctx.scalar_value(2) {
            ConvertPolicy::from_value(policy)?;
        }
        validate_binary(ctx, 3)
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> KernelResult<()> {
        let policy = ConvertPolicy::from_value(ctx.scalar(2)?)?;
        let (a, b, out) = ctx.binary_image(0, 1, 3)?;
        check_same_size(a, b, out)?;
        for i in 0..out.pixel_count() {
            let value = a.sample(i) - b.sample(i);
            out.store(i, policy.apply(value, out.format));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::error::VerifyError;
    use crate::graph::Graph;

    fn s16_pixels(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_policy_decoding() {
        assert_eq!(
            ConvertPolicy::from_value(ScalarValue::Enum(1)).unwrap(),
            ConvertPolicy::Saturate
        );
        assert_eq!(ConvertPolicy::Wrap.to_value(), ScalarValue::Enum(0));
        assert!(ConvertPolicy::from_value(ScalarValue::Enum(7)).is_err());
    }

    #[test]
    fn test_add_u8_saturate_and_wrap() {
        for (policy, expected) in [
            (ConvertPolicy::Saturate, vec![255u8, 30]),
            (ConvertPolicy::Wrap, vec![44u8, 30]),
        ] {
            let mut graph = Graph::new(Context::new_shared());
            let a = graph.create_image(2, 1, ImageFormat::U8).unwrap();
            let b = graph.create_image(2, 1, ImageFormat::U8).unwrap();
            let p = graph.create_scalar(policy.to_value());
            let out = graph.create_virtual();
            graph.write_image(a, &[200, 10]).unwrap();
            graph.write_image(b, &[100, 20]).unwrap();

            graph.add_node("org.khronos.openvx.add", &[a, b, p, out]).unwrap();
            graph.verify().unwrap();
            assert_eq!(
                graph.data_desc(out).unwrap(),
                Some(DataDesc::image(2, 1, ImageFormat::U8))
            );
            graph.process().unwrap();
            assert_eq!(graph.read_image(out).unwrap(), expected);
        }
    }

    #[test]
    fn test_subtract_infers_s16() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 1, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 1, ImageFormat::S16).unwrap();
        let p = graph.create_scalar(ConvertPolicy::Saturate.to_value());
        let out = graph.create_virtual();
        graph.write_image(a, &[5, 0]).unwrap();
        let mut b_bytes = Vec::new();
        b_bytes.extend_from_slice(&10i16.to_ne_bytes());
        b_bytes.extend_from_slice(&(-3i16).to_ne_bytes());
        graph.write_image(b, &b_bytes).unwrap();

        graph.add_node("org.khronos.openvx.subtract", &[a, b, p, out]).unwrap();
        graph.verify().unwrap();
        assert_eq!(
            graph.data_desc(out).unwrap(),
            Some(DataDesc::image(2, 1, ImageFormat::S16))
        );
        graph.process().unwrap();
        assert_eq!(s16_pixels(&graph.read_image(out).unwrap()), vec![-5, 3]);
    }

    #[test]
    fn test_add_rejects_u8_output_from_s16() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 2, ImageFormat::S16).unwrap();
        let b = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let p = graph.create_scalar(ConvertPolicy::Wrap.to_value());
        let out = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        graph.add_node("org.khronos.openvx.add", &[a, b, p, out]).unwrap();
        assert!(matches!(
            graph.verify(),
            Err(VerifyError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_absdiff_requires_equal_sizes() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 2, ImageFormat::U8).unwrap();
        let b = graph.create_image(3, 2, ImageFormat::U8).unwrap();
        let out = graph.create_virtual();
        graph.add_node("org.khronos.openvx.absdiff", &[a, b, out]).unwrap();
        assert!(matches!(
            graph.verify(),
            Err(VerifyError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_absdiff_u8() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(3, 1, ImageFormat::U8).unwrap();
        let b = graph.create_image(3, 1, ImageFormat::U8).unwrap();
        let out = graph.create_virtual();
        graph.write_image(a, &[10, 200, 7]).unwrap();
        graph.write_image(b, &[30, 100, 7]).unwrap();
        graph.add_node("org.khronos.openvx.absdiff", &[a, b, out]).unwrap();
        graph.verify().unwrap();
        graph.process().unwrap();
        assert_eq!(graph.read_image(out).unwrap(), vec![20, 100, 0]);
    }
}
