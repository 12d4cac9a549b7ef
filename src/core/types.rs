//! Descriptor types for the data objects that flow through a graph.
//!
//! The type system is a closed set of enums:
//! - [`ImageFormat`] and [`ScalarType`] name the element encodings
//! - [`DataDesc`] is the fully-resolved shape of a data object
//! - [`TypeConstraint`] is what a kernel parameter slot accepts
//! - [`ScalarValue`] carries the value stored in a scalar object

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image pixel formats, encoded as FourCC codes like the OpenVX `VX_DF_IMAGE_*`
/// family.
///
/// Only single-plane formats are supported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// 8-bit unsigned luma.
    U8,
    /// 8-bit greyscale, FourCC `Y800`.
    Y800,
    /// 16-bit unsigned.
    U16,
    /// 16-bit signed.
    S16,
    /// 32-bit unsigned.
    U32,
    /// 32-bit signed.
    S32,
    /// Packed 24-bit RGB.
    Rgb,
    /// Packed 32-bit RGB with a padding byte.
    Rgbx,
}

impl ImageFormat {
    /// All supported formats.
    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::U8,
        ImageFormat::Y800,
        ImageFormat::U16,
        ImageFormat::S16,
        ImageFormat::U32,
        ImageFormat::S32,
        ImageFormat::Rgb,
        ImageFormat::Rgbx,
    ];

    /// Size of one pixel in bytes.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::U8 | ImageFormat::Y800 => 1,
            ImageFormat::U16 | ImageFormat::S16 => 2,
            ImageFormat::Rgb => 3,
            ImageFormat::U32 | ImageFormat::S32 | ImageFormat::Rgbx => 4,
        }
    }

    /// The four-character code of this format.
    pub fn fourcc(&self) -> &'static str {
        match self {
            ImageFormat::U8 => "U008",
            ImageFormat::Y800 => "Y800",
            ImageFormat::U16 => "U016",
            ImageFormat::S16 => "S016",
            ImageFormat::U32 => "U032",
            ImageFormat::S32 => "S032",
            ImageFormat::Rgb => "RGB2",
            ImageFormat::Rgbx => "RGBA",
        }
    }

    /// Look up a format by its four-character code.
    pub fn from_fourcc(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.fourcc() == code)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Element types for scalars and array items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    U8,
    I16,
    U32,
    I32,
    F32,
    Bool,
    /// Enumerated constant such as a conversion policy.
    Enum,
}

impl ScalarType {
    /// Storage size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::Bool => 1,
            ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 | ScalarType::Enum => 4,
        }
    }

    /// The zero value of this type.
    pub fn zero(&self) -> ScalarValue {
        match self {
            ScalarType::U8 => ScalarValue::U8(0),
            ScalarType::I16 => ScalarValue::I16(0),
            ScalarType::U32 => ScalarValue::U32(0),
            ScalarType::I32 => ScalarValue::I32(0),
            ScalarType::F32 => ScalarValue::F32(0.0),
            ScalarType::Bool => ScalarValue::Bool(false),
            ScalarType::Enum => ScalarValue::Enum(0),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::U8 => "u8",
            ScalarType::I16 => "i16",
            ScalarType::U32 => "u32",
            ScalarType::I32 => "i32",
            ScalarType::F32 => "f32",
            ScalarType::Bool => "bool",
            ScalarType::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// A typed scalar value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ScalarValue {
    U8(u8),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
    Enum(i32),
}

impl ScalarValue {
    /// The type of this value.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::U8(_) => ScalarType::U8,
            ScalarValue::I16(_) => ScalarType::I16,
            ScalarValue::U32(_) => ScalarType::U32,
            ScalarValue::I32(_) => ScalarType::I32,
            ScalarValue::F32(_) => ScalarType::F32,
            ScalarValue::Bool(_) => ScalarType::Bool,
            ScalarValue::Enum(_) => ScalarType::Enum,
        }
    }

    /// Try to get this value as a `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ScalarValue::U8(v) => Some(u32::from(*v)),
            ScalarValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as an `i32`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ScalarValue::U8(v) => Some(i32::from(*v)),
            ScalarValue::I16(v) => Some(i32::from(*v)),
            ScalarValue::I32(v) | ScalarValue::Enum(v) => Some(*v),
            _ => None,
        }
    }
}

/// Fully-resolved description of a data object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataDesc {
    Image {
        width: u32,
        height: u32,
        format: ImageFormat,
    },
    Scalar {
        ty: ScalarType,
    },
    Array {
        item: ScalarType,
        capacity: usize,
    },
}

impl DataDesc {
    /// Image descriptor shorthand.
    pub fn image(width: u32, height: u32, format: ImageFormat) -> Self {
        DataDesc::Image { width, height, format }
    }

    /// Scalar descriptor shorthand.
    pub fn scalar(ty: ScalarType) -> Self {
        DataDesc::Scalar { ty }
    }

    /// Array descriptor shorthand.
    pub fn array(item: ScalarType, capacity: usize) -> Self {
        DataDesc::Array { item, capacity }
    }

    /// Number of bytes needed to back an object of this shape, saturating.
    pub fn byte_size(&self) -> usize {
        match self {
            DataDesc::Image { width, height, format } => {
                (*width as usize)
                    .saturating_mul(*height as usize)
                    .saturating_mul(format.bytes_per_pixel())
            }
            DataDesc::Scalar { ty } => ty.size(),
            DataDesc::Array { item, capacity } => item.size().saturating_mul(*capacity),
        }
    }

    /// Image format, if this is an image.
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            DataDesc::Image { format, .. } => Some(*format),
            _ => None,
        }
    }

    /// Image dimensions, if this is an image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            DataDesc::Image { width, height, .. } => Some((*width, *height)),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DataDesc::Image { .. })
    }
}

impl fmt::Display for DataDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDesc::Image { width, height, format } => {
                write!(f, "image {}x{} {}", width, height, format)
            }
            DataDesc::Scalar { ty } => write!(f, "scalar {}", ty),
            DataDesc::Array { item, capacity } => write!(f, "array<{}>[{}]", item, capacity),
        }
    }
}

/// Lifecycle state of a graph.
///
/// `Unverified -> Verified -> Running -> (Completed | Failed)`. Any
/// structural edit returns the graph to `Unverified`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphState {
    #[default]
    Unverified,
    Verified,
    Running,
    Completed,
    Failed,
}

impl GraphState {
    /// Whether a verified plan may exist in this state.
    pub fn has_plan(&self) -> bool {
        matches!(
            self,
            GraphState::Verified | GraphState::Completed | GraphState::Failed
        )
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphState::Unverified => "unverified",
            GraphState::Verified => "verified",
            GraphState::Running => "running",
            GraphState::Completed => "completed",
            GraphState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Direction of a kernel parameter slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
    Bidirectional,
}

impl Direction {
    /// Whether the kernel reads this slot.
    pub fn reads(&self) -> bool {
        matches!(self, Direction::Input | Direction::Bidirectional)
    }

    /// Whether the kernel writes this slot.
    pub fn writes(&self) -> bool {
        matches!(self, Direction::Output | Direction::Bidirectional)
    }
}

/// What a parameter slot accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "accepts", content = "of", rename_all = "snake_case")]
pub enum TypeConstraint {
    /// Any image, any format.
    AnyImage,
    /// An image of exactly this format.
    Image(ImageFormat),
    /// An image of one of these formats.
    ImageOneOf(Vec<ImageFormat>),
    /// A scalar of exactly this type.
    Scalar(ScalarType),
    /// Any scalar.
    AnyScalar,
    /// An array of this item type.
    Array(ScalarType),
    /// Any array.
    AnyArray,
}

impl TypeConstraint {
    /// Check whether a resolved descriptor satisfies this constraint.
    pub fn accepts(&self, desc: &DataDesc) -> bool {
        match (self, desc) {
            (TypeConstraint::AnyImage, DataDesc::Image { .. }) => true,
            (TypeConstraint::Image(want), DataDesc::Image { format, .. }) => want == format,
            (TypeConstraint::ImageOneOf(allowed), DataDesc::Image { format, .. }) => {
                allowed.contains(format)
            }
            (TypeConstraint::Scalar(want), DataDesc::Scalar { ty }) => want == ty,
            (TypeConstraint::AnyScalar, DataDesc::Scalar { .. }) => true,
            (TypeConstraint::Array(want), DataDesc::Array { item, .. }) => want == item,
            (TypeConstraint::AnyArray, DataDesc::Array { .. }) => true,
            _ => false,
        }
    }

    /// Whether two constraints can be satisfied by one descriptor.
    ///
    /// Used to reject a virtual object bound to slots that could never agree
    /// (an image slot and a scalar slot, two disjoint format sets).
    pub fn overlaps(&self, other: &TypeConstraint) -> bool {
        let formats = |c: &TypeConstraint| -> Option<Vec<ImageFormat>> {
            match c {
                TypeConstraint::AnyImage => Some(ImageFormat::ALL.to_vec()),
                TypeConstraint::Image(f) => Some(vec![*f]),
                TypeConstraint::ImageOneOf(fs) => Some(fs.clone()),
                _ => None,
            }
        };
        match (formats(self), formats(other)) {
            (Some(a), Some(b)) => a.iter().any(|f| b.contains(f)),
            (None, None) => match (self, other) {
                (TypeConstraint::AnyScalar, TypeConstraint::AnyScalar)
                | (TypeConstraint::AnyScalar, TypeConstraint::Scalar(_))
                | (TypeConstraint::Scalar(_), TypeConstraint::AnyScalar) => true,
                (TypeConstraint::Scalar(a), TypeConstraint::Scalar(b)) => a == b,
                (TypeConstraint::Array(a), TypeConstraint::Array(b)) => a == b,
                (TypeConstraint::AnyArray, TypeConstraint::Array(_))
                | (TypeConstraint::Array(_), TypeConstraint::AnyArray)
                | (TypeConstraint::AnyArray, TypeConstraint::AnyArray) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::AnyImage => write!(f, "image"),
            TypeConstraint::Image(format) => write!(f, "image {}", format),
            TypeConstraint::ImageOneOf(formats) => {
                let names: Vec<&str> = formats.iter().map(|fmt| fmt.fourcc()).collect();
                write!(f, "image {{{}}}", names.join("|"))
            }
            TypeConstraint::Scalar(ty) => write!(f, "scalar {}", ty),
            TypeConstraint::AnyScalar => write!(f, "scalar"),
            TypeConstraint::Array(item) => write!(f, "array<{}>", item),
            TypeConstraint::AnyArray => write!(f, "array"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_byte_size() {
        let desc = DataDesc::image(640, 480, ImageFormat::U8);
        assert_eq!(desc.byte_size(), 640 * 480);

        let desc = DataDesc::image(4, 2, ImageFormat::S16);
        assert_eq!(desc.byte_size(), 16);
    }

    #[test]
    fn test_constraint_accepts() {
        let u8_image = DataDesc::image(8, 8, ImageFormat::U8);
        let y800_image = DataDesc::image(8, 8, ImageFormat::Y800);

        assert!(TypeConstraint::AnyImage.accepts(&u8_image));
        assert!(TypeConstraint::Image(ImageFormat::U8).accepts(&u8_image));
        assert!(!TypeConstraint::Image(ImageFormat::U8).accepts(&y800_image));
        assert!(!TypeConstraint::AnyScalar.accepts(&u8_image));
        assert!(TypeConstraint::ImageOneOf(vec![ImageFormat::U8, ImageFormat::S16]).accepts(&u8_image));
    }

    #[test]
    fn test_constraint_overlap() {
        let u8_or_s16 = TypeConstraint::ImageOneOf(vec![ImageFormat::U8, ImageFormat::S16]);
        assert!(u8_or_s16.overlaps(&TypeConstraint::AnyImage));
        assert!(u8_or_s16.overlaps(&TypeConstraint::Image(ImageFormat::S16)));
        assert!(!u8_or_s16.overlaps(&TypeConstraint::Image(ImageFormat::Rgb)));
        assert!(!u8_or_s16.overlaps(&TypeConstraint::AnyScalar));
        assert!(TypeConstraint::AnyScalar.overlaps(&TypeConstraint::Scalar(ScalarType::U32)));
    }

    #[test]
    fn test_fourcc_lookup() {
        assert_eq!(ImageFormat::from_fourcc("Y800"), Some(ImageFormat::Y800));
        assert_eq!(ImageFormat::from_fourcc("ZZZZ"), None);
    }
}
