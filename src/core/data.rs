//! Data objects: the images, scalars and arrays that nodes read and write.
//!
//! Data objects live in a [`DataArena`] owned by one graph and are handed out
//! to clients as [`DataRef`] handles. A handle carries the id of the graph
//! that created it, so a handle from another graph, or one whose object has
//! been released, is rejected instead of aliasing unrelated memory.
//!
//! Payloads sit behind a `parking_lot::RwLock`. During execution a node holds
//! a read guard for each input slot and a write guard for each output slot.

use crate::core::error::{DataError, DataId, DataResult, GraphId, NodeId};
use crate::core::types::{DataDesc, ImageFormat, ScalarType, ScalarValue, TypeConstraint};
use image::{GrayImage, RgbImage};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Handle to a data object inside a specific graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataRef {
    graph: GraphId,
    id: DataId,
}

impl DataRef {
    /// Id of the referenced object.
    pub fn id(&self) -> DataId {
        self.id
    }

    /// Graph the object belongs to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.graph)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Pixel storage of an image object, rows packed without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    /// Allocate a zero-filled image.
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        let len = DataDesc::image(width, height, format).byte_size();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Descriptor matching this buffer.
    pub fn desc(&self) -> DataDesc {
        DataDesc::image(self.width, self.height, self.format)
    }

    /// Read pixel `i` of a single-channel image as a signed integer.
    ///
    /// Multi-byte formats use native byte order, as the pixel memory would be
    /// laid out by the platform.
    pub fn sample(&self, i: usize) -> i64 {
        let bpp = self.format.bytes_per_pixel();
        let bytes = &self.data[i * bpp..(i + 1) * bpp];
        match self.format {
            ImageFormat::U8 | ImageFormat::Y800 => i64::from(bytes[0]),
            ImageFormat::U16 => i64::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
            ImageFormat::S16 => i64::from(i16::from_ne_bytes([bytes[0], bytes[1]])),
            ImageFormat::U32 => {
                i64::from(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ImageFormat::S32 => {
                i64::from(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ImageFormat::Rgb | ImageFormat::Rgbx => i64::from(bytes[0]),
        }
    }

    /// Write pixel `i` of a single-channel image, truncating to the format.
    pub fn store(&mut self, i: usize, value: i64) {
        let bpp = self.format.bytes_per_pixel();
        let bytes = &mut self.data[i * bpp..(i + 1) * bpp];
        match self.format {
            ImageFormat::U8 | ImageFormat::Y800 | ImageFormat::Rgb | ImageFormat::Rgbx => {
                bytes[0] = value as u8
            }
            ImageFormat::U16 => bytes.copy_from_slice(&(value as u16).to_ne_bytes()),
            ImageFormat::S16 => bytes.copy_from_slice(&(value as i16).to_ne_bytes()),
            ImageFormat::U32 => bytes.copy_from_slice(&(value as u32).to_ne_bytes()),
            ImageFormat::S32 => bytes.copy_from_slice(&(value as i32).to_ne_bytes()),
        }
    }

    /// Convert a `U8` or `Y800` image to an [`image::GrayImage`].
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        match self.format {
            ImageFormat::U8 | ImageFormat::Y800 => {
                GrayImage::from_raw(self.width, self.height, self.data.clone())
            }
            _ => None,
        }
    }

    /// Convert an `Rgb` image to an [`image::RgbImage`].
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        match self.format {
            ImageFormat::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone()),
            _ => None,
        }
    }
}

impl From<&GrayImage> for ImageBuffer {
    fn from(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format: ImageFormat::U8,
            data: image.as_raw().clone(),
        }
    }
}

impl From<&RgbImage> for ImageBuffer {
    fn from(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format: ImageFormat::Rgb,
            data: image.as_raw().clone(),
        }
    }
}

/// Item storage of an array object.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBuffer {
    pub item: ScalarType,
    pub capacity: usize,
    pub items: Vec<ScalarValue>,
}

impl ArrayBuffer {
    /// Allocate an empty array.
    pub fn new(item: ScalarType, capacity: usize) -> Self {
        Self {
            item,
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Replace the contents, truncating to capacity.
    ///
    /// Fails if any item has the wrong type.
    pub fn set_items(&mut self, items: &[ScalarValue]) -> Result<(), ScalarType> {
        if let Some(bad) = items.iter().find(|v| v.scalar_type() != self.item) {
            return Err(bad.scalar_type());
        }
        self.items.clear();
        self.items
            .extend(items.iter().take(self.capacity).copied());
        Ok(())
    }
}

/// Backing memory of a data object.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Image(ImageBuffer),
    Scalar(ScalarValue),
    Array(ArrayBuffer),
}

impl Payload {
    /// Allocate zeroed storage for a descriptor.
    pub fn allocate(desc: &DataDesc) -> Self {
        match *desc {
            DataDesc::Image {
                width,
                height,
                format,
            } => Payload::Image(ImageBuffer::new(width, height, format)),
            DataDesc::Scalar { ty } => Payload::Scalar(ty.zero()),
            DataDesc::Array { item, capacity } => Payload::Array(ArrayBuffer::new(item, capacity)),
        }
    }

    /// Short name of the payload kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Image(_) => "image",
            Payload::Scalar(_) => "scalar",
            Payload::Array(_) => "array",
        }
    }

    /// The image buffer, if this is an image.
    pub fn as_image(&self) -> Option<&ImageBuffer> {
        match self {
            Payload::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Mutable image buffer, if this is an image.
    pub fn as_image_mut(&mut self) -> Option<&mut ImageBuffer> {
        match self {
            Payload::Image(image) => Some(image),
            _ => None,
        }
    }

    /// The scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match self {
            Payload::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// The array buffer, if this is an array.
    pub fn as_array(&self) -> Option<&ArrayBuffer> {
        match self {
            Payload::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Mutable array buffer, if this is an array.
    pub fn as_array_mut(&mut self) -> Option<&mut ArrayBuffer> {
        match self {
            Payload::Array(array) => Some(array),
            _ => None,
        }
    }
}

// ============================================================================
// Data Objects
// ============================================================================

/// Partial descriptor pinned on a virtual image at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHint {
    pub format: Option<ImageFormat>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageHint {
    /// Whether a resolved descriptor agrees with every pinned field.
    pub fn agrees_with(&self, desc: &DataDesc) -> bool {
        match desc {
            DataDesc::Image {
                width,
                height,
                format,
            } => {
                self.format.map_or(true, |f| f == *format)
                    && self.width.map_or(true, |w| w == *width)
                    && self.height.map_or(true, |h| h == *height)
            }
            _ => false,
        }
    }

    /// The full descriptor, when every field is pinned.
    pub fn complete(&self) -> Option<DataDesc> {
        Some(DataDesc::image(self.width?, self.height?, self.format?))
    }
}

/// Type state of a data object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataState {
    /// Created with a full descriptor.
    Concrete(DataDesc),
    /// Virtual and not yet resolved.
    Pending,
    /// Virtual and resolved by the last verification.
    Resolved(DataDesc),
}

/// A single data object.
pub struct DataObject {
    id: DataId,
    state: DataState,
    hint: Option<ImageHint>,
    /// Slot constraints recorded by the nodes that bind this virtual object.
    constraints: Vec<(NodeId, TypeConstraint)>,
    /// References held by client handles.
    external: AtomicUsize,
    /// References held by node bindings.
    internal: AtomicUsize,
    payload: RwLock<Option<Payload>>,
}

impl DataObject {
    fn concrete(id: DataId, desc: DataDesc) -> Self {
        Self {
            id,
            state: DataState::Concrete(desc),
            hint: None,
            constraints: Vec::new(),
            external: AtomicUsize::new(1),
            internal: AtomicUsize::new(0),
            payload: RwLock::new(Some(Payload::allocate(&desc))),
        }
    }

    fn virtual_object(id: DataId, hint: Option<ImageHint>) -> Self {
        Self {
            id,
            state: DataState::Pending,
            hint,
            constraints: Vec::new(),
            external: AtomicUsize::new(1),
            internal: AtomicUsize::new(0),
            payload: RwLock::new(None),
        }
    }

    pub fn id(&self) -> DataId {
        self.id
    }

    pub fn state(&self) -> &DataState {
        &self.state
    }

    /// Whether the object was created virtual.
    pub fn is_virtual(&self) -> bool {
        !matches!(self.state, DataState::Concrete(_))
    }

    /// Resolved descriptor, if known.
    pub fn desc(&self) -> Option<DataDesc> {
        match self.state {
            DataState::Concrete(desc) | DataState::Resolved(desc) => Some(desc),
            DataState::Pending => None,
        }
    }

    /// Partial descriptor pinned at creation.
    pub fn hint(&self) -> Option<&ImageHint> {
        self.hint.as_ref()
    }

    /// Constraints recorded by nodes binding this object while virtual.
    pub fn constraints(&self) -> &[(NodeId, TypeConstraint)] {
        &self.constraints
    }

    /// Total reference count, client handles plus node bindings.
    pub fn ref_count(&self) -> usize {
        self.external_count() + self.internal_count()
    }

    /// References held by client handles.
    pub fn external_count(&self) -> usize {
        self.external.load(Ordering::Acquire)
    }

    /// References held by node bindings.
    pub fn internal_count(&self) -> usize {
        self.internal.load(Ordering::Acquire)
    }

    /// Take one more client reference.
    pub fn retain(&self) -> usize {
        self.external.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn retain_internal(&self) -> usize {
        self.internal.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one client reference, returning the client references left.
    ///
    /// Releasing a handle the client no longer holds is an error.
    fn release_external(&self) -> DataResult<usize> {
        self.external
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| DataError::InvalidReference(self.id))
    }

    fn release_internal(&self) -> DataResult<usize> {
        self.internal
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| DataError::InvalidReference(self.id))
    }

    /// Whether backing memory exists.
    pub fn is_allocated(&self) -> bool {
        self.payload.read().is_some()
    }

    /// Resolve a virtual object to a descriptor.
    ///
    /// Resolving twice with the same descriptor is a no-op; a different
    /// descriptor, or one that disagrees with the pinned hint, is a conflict.
    /// A descriptor that could not be allocated is `InvalidFormat`.
    pub fn resolve(&mut self, desc: DataDesc) -> DataResult<()> {
        match self.state {
            DataState::Concrete(_) => Err(DataError::NotVirtual(self.id)),
            DataState::Resolved(existing) if existing != desc => Err(DataError::TypeConflict {
                data: self.id,
                existing,
                requested: desc,
            }),
            DataState::Resolved(_) => Ok(()),
            DataState::Pending => {
                validate_desc(&desc)?;
                if let Some(hint) = &self.hint {
                    if !hint.agrees_with(&desc) {
                        let existing = hint.complete().unwrap_or(DataDesc::image(
                            hint.width.unwrap_or(0),
                            hint.height.unwrap_or(0),
                            hint.format.unwrap_or(ImageFormat::U8),
                        ));
                        return Err(DataError::TypeConflict {
                            data: self.id,
                            existing,
                            requested: desc,
                        });
                    }
                }
                self.state = DataState::Resolved(desc);
                Ok(())
            }
        }
    }

    /// Return a virtual object to the pending state and drop its memory.
    pub(crate) fn reset(&mut self) {
        if self.is_virtual() {
            self.state = DataState::Pending;
            *self.payload.get_mut() = None;
        }
    }

    pub(crate) fn add_constraint(&mut self, node: NodeId, constraint: TypeConstraint) {
        self.constraints.push((node, constraint));
    }

    pub(crate) fn remove_constraints(&mut self, node: NodeId) {
        self.constraints.retain(|(n, _)| *n != node);
    }

    /// Allocate zeroed memory for the resolved descriptor if none exists.
    ///
    /// Returns the number of bytes allocated.
    pub(crate) fn allocate(&mut self) -> DataResult<usize> {
        let desc = self.desc().ok_or(DataError::NotAllocated(self.id))?;
        let payload = self.payload.get_mut();
        if payload.is_some() {
            return Ok(0);
        }
        *payload = Some(Payload::allocate(&desc));
        Ok(desc.byte_size())
    }

    /// Shared access to the payload.
    pub fn read(&self) -> RwLockReadGuard<'_, Option<Payload>> {
        self.payload.read_recursive()
    }

    /// Exclusive access to the payload.
    pub fn write(&self) -> RwLockWriteGuard<'_, Option<Payload>> {
        self.payload.write()
    }
}

impl fmt::Debug for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("hint", &self.hint)
            .field("external", &self.external_count())
            .field("internal", &self.internal_count())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

// ============================================================================
// Arena
// ============================================================================

/// Graph-scoped storage for data objects.
///
/// Released objects leave a tombstone so ids are never reused.
#[derive(Debug)]
pub struct DataArena {
    graph: GraphId,
    slots: Vec<Option<DataObject>>,
}

impl DataArena {
    /// Create an empty arena for a graph.
    pub fn new(graph: GraphId) -> Self {
        Self {
            graph,
            slots: Vec::new(),
        }
    }

    fn next_ref(&self) -> DataRef {
        DataRef {
            graph: self.graph,
            id: DataId(self.slots.len() as u32),
        }
    }

    /// Create a concrete object, validating its descriptor.
    pub fn create(&mut self, desc: DataDesc) -> DataResult<DataRef> {
        validate_desc(&desc)?;
        let data_ref = self.next_ref();
        self.slots.push(Some(DataObject::concrete(data_ref.id, desc)));
        Ok(data_ref)
    }

    /// Create a concrete scalar holding `value`.
    pub fn create_scalar(&mut self, value: ScalarValue) -> DataRef {
        let data_ref = self.next_ref();
        let mut object =
            DataObject::concrete(data_ref.id, DataDesc::scalar(value.scalar_type()));
        *object.payload.get_mut() = Some(Payload::Scalar(value));
        self.slots.push(Some(object));
        data_ref
    }

    /// Create a virtual object of unknown type.
    pub fn create_virtual(&mut self) -> DataRef {
        let data_ref = self.next_ref();
        self.slots
            .push(Some(DataObject::virtual_object(data_ref.id, None)));
        data_ref
    }

    /// Create a virtual image with a partially pinned descriptor.
    pub fn create_virtual_image(&mut self, hint: ImageHint) -> DataResult<DataRef> {
        if hint.width == Some(0) || hint.height == Some(0) {
            return Err(DataError::InvalidFormat {
                reason: "virtual image dimensions must be non-zero".to_string(),
            });
        }
        if let (Some(width), Some(height), Some(format)) = (hint.width, hint.height, hint.format) {
            image_size(width, height, format)?;
        }
        let data_ref = self.next_ref();
        self.slots
            .push(Some(DataObject::virtual_object(data_ref.id, Some(hint))));
        Ok(data_ref)
    }

    fn check_scope(&self, data_ref: DataRef) -> DataResult<usize> {
        if data_ref.graph != self.graph {
            return Err(DataError::InvalidReference(data_ref.id));
        }
        Ok(data_ref.id.0 as usize)
    }

    /// Look up a live object.
    pub fn get(&self, data_ref: DataRef) -> DataResult<&DataObject> {
        let index = self.check_scope(data_ref)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(DataError::InvalidReference(data_ref.id))
    }

    /// Look up a live object mutably.
    pub fn get_mut(&mut self, data_ref: DataRef) -> DataResult<&mut DataObject> {
        let index = self.check_scope(data_ref)?;
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DataError::InvalidReference(data_ref.id))
    }

    /// Look up a live object by id.
    pub fn by_id(&self, id: DataId) -> Option<&DataObject> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Look up a live object mutably by id.
    pub fn by_id_mut(&mut self, id: DataId) -> Option<&mut DataObject> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Drop one client reference.
    ///
    /// Returns the client references left. The object is freed once neither
    /// clients nor node bindings hold it.
    pub fn release(&mut self, data_ref: DataRef) -> DataResult<usize> {
        let remaining = self.get(data_ref)?.release_external()?;
        self.free_if_unreferenced(data_ref);
        Ok(remaining)
    }

    /// Drop the reference held by a node binding.
    pub(crate) fn release_internal(&mut self, data_ref: DataRef) -> DataResult<usize> {
        let remaining = self.get(data_ref)?.release_internal()?;
        self.free_if_unreferenced(data_ref);
        Ok(remaining)
    }

    fn free_if_unreferenced(&mut self, data_ref: DataRef) {
        let index = data_ref.id.0 as usize;
        if let Some(Some(object)) = self.slots.get(index) {
            if object.ref_count() == 0 {
                log::debug!("freeing data object {}", data_ref.id);
                self.slots[index] = None;
            }
        }
    }

    /// Rebuild a handle for a live object id.
    pub fn handle(&self, id: DataId) -> Option<DataRef> {
        self.by_id(id).map(|_| DataRef {
            graph: self.graph,
            id,
        })
    }

    /// Iterate over live objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = &DataObject> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate mutably over live objects in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataObject> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_desc(desc: &DataDesc) -> DataResult<()> {
    match *desc {
        DataDesc::Image { width, height, .. } if width == 0 || height == 0 => {
            Err(DataError::InvalidFormat {
                reason: format!("image dimensions must be non-zero, got {}x{}", width, height),
            })
        }
        DataDesc::Image {
            width,
            height,
            format,
        } => image_size(width, height, format).map(|_| ()),
        DataDesc::Array { capacity: 0, .. } => Err(DataError::InvalidFormat {
            reason: "array capacity must be non-zero".to_string(),
        }),
        DataDesc::Array { item, capacity } => item
            .size()
            .checked_mul(capacity)
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .map(|_| ())
            .ok_or_else(|| DataError::InvalidFormat {
                reason: format!("array of {} {} items is too large", capacity, item),
            }),
        DataDesc::Scalar { .. } => Ok(()),
    }
}

/// Byte size of an image, or `InvalidFormat` if it does not fit in memory.
fn image_size(width: u32, height: u32, format: ImageFormat) -> DataResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| DataError::InvalidFormat {
            reason: format!("image of {}x{} {} is too large", width, height, format),
        })
}
