//! Validation and execution contexts.
//!
//! Contexts give a kernel access to the data bound to its node. The
//! validation context carries descriptors only, the execution context holds
//! the payload locks for the duration of one kernel call.

use crate::core::data::{ArrayBuffer, DataObject, ImageBuffer, Payload};
use crate::core::error::{KernelError, KernelResult, NodeId};
use crate::core::kernel::{KernelMetadata, ParameterDefinition};
use crate::core::types::{DataDesc, Direction, ImageFormat, ScalarValue};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Context provided during verification.
///
/// Holds the descriptor bound to every slot (`None` while a virtual input is
/// unresolved) and the value of every concrete input scalar.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// ID of the node being verified.
    pub node_id: NodeId,
    metadata: Arc<KernelMetadata>,
    descs: Vec<Option<DataDesc>>,
    values: Vec<Option<ScalarValue>>,
}

impl ValidationContext {
    /// Create a new validation context.
    pub fn new(
        node_id: NodeId,
        metadata: Arc<KernelMetadata>,
        descs: Vec<Option<DataDesc>>,
        values: Vec<Option<ScalarValue>>,
    ) -> Self {
        Self {
            node_id,
            metadata,
            descs,
            values,
        }
    }

    /// Name of the kernel being verified.
    pub fn kernel_name(&self) -> &str {
        &self.metadata.name
    }

    /// Slot definition by index.
    pub fn parameter(&self, index: usize) -> Option<&ParameterDefinition> {
        self.metadata.parameter(index)
    }

    pub fn parameter_count(&self) -> usize {
        self.metadata.parameter_count()
    }

    /// Descriptor bound to a slot.
    pub fn desc(&self, index: usize) -> Option<DataDesc> {
        self.descs.get(index).copied().flatten()
    }

    /// Resolved descriptors of every slot the kernel reads.
    pub fn inputs(&self) -> impl Iterator<Item = (usize, DataDesc)> + '_ {
        self.metadata
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction.reads())
            .filter_map(move |(i, _)| self.desc(i).map(|d| (i, d)))
    }

    /// Descriptor of the first input image.
    pub fn first_input_image(&self) -> Option<DataDesc> {
        self.inputs()
            .map(|(_, desc)| desc)
            .find(DataDesc::is_image)
    }

    // ========================================================================
    // Typed Getters
    // ========================================================================

    /// Dimensions of an image slot.
    pub fn dimensions(&self, index: usize) -> KernelResult<(u32, u32)> {
        self.desc(index)
            .and_then(|d| d.dimensions())
            .ok_or_else(|| {
                KernelError::invalid_parameters(format!("parameter {} is not an image", index))
            })
    }

    /// Format of an image slot.
    pub fn format(&self, index: usize) -> KernelResult<ImageFormat> {
        self.desc(index)
            .and_then(|d| d.image_format())
            .ok_or_else(|| {
                KernelError::invalid_parameters(format!("parameter {} is not an image", index))
            })
    }

    /// Value of a concrete input scalar, known before execution.
    pub fn scalar_value(&self, index: usize) -> Option<ScalarValue> {
        self.values.get(index).copied().flatten()
    }

    /// Fail unless two image slots have equal dimensions.
    pub fn require_same_dimensions(&self, a: usize, b: usize) -> KernelResult<()> {
        let (da, db) = (self.dimensions(a)?, self.dimensions(b)?);
        if da != db {
            return Err(KernelError::invalid_parameters(format!(
                "parameters {} and {} differ in size: {}x{} vs {}x{}",
                a, b, da.0, da.1, db.0, db.1
            )));
        }
        Ok(())
    }
}

/// Lock held on one bound data object during a kernel call.
pub(crate) enum SlotGuard<'a> {
    Read(RwLockReadGuard<'a, Option<Payload>>),
    Write(RwLockWriteGuard<'a, Option<Payload>>),
}

impl SlotGuard<'_> {
    fn payload(&self, index: usize) -> KernelResult<&Payload> {
        let payload: &Option<Payload> = match self {
            SlotGuard::Read(guard) => guard,
            SlotGuard::Write(guard) => guard,
        };
        payload.as_ref().ok_or_else(|| unallocated(index))
    }

    fn payload_mut(&mut self, index: usize) -> KernelResult<&mut Payload> {
        match self {
            SlotGuard::Write(guard) => {
                let payload: &mut Option<Payload> = guard;
                payload.as_mut().ok_or_else(|| unallocated(index))
            }
            SlotGuard::Read(_) => Err(KernelError::new(
                KernelError::INVALID_ACCESS,
                format!("parameter {} is read-only", index),
            )),
        }
    }
}

fn unallocated(index: usize) -> KernelError {
    KernelError::failure(format!("parameter {} has no backing memory", index))
}

fn wrong_kind(index: usize, expected: &str, payload: &Payload) -> KernelError {
    KernelError::invalid_parameters(format!(
        "parameter {} is {}, expected {}",
        index,
        payload.kind(),
        expected
    ))
}

/// Context provided during node execution.
///
/// Input slots are read-only; output and bidirectional slots are mutable.
pub struct ExecutionContext<'a> {
    /// ID of the node being executed.
    pub node_id: NodeId,
    slots: Vec<SlotGuard<'a>>,
}

impl<'a> ExecutionContext<'a> {
    /// Lock every bound object according to its slot direction.
    pub(crate) fn bind(node_id: NodeId, bindings: Vec<(&'a DataObject, Direction)>) -> Self {
        let slots = bindings
            .into_iter()
            .map(|(object, direction)| {
                if direction.writes() {
                    SlotGuard::Write(object.write())
                } else {
                    SlotGuard::Read(object.read())
                }
            })
            .collect();
        Self { node_id, slots }
    }

    pub fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, index: usize) -> KernelResult<&SlotGuard<'a>> {
        self.slots.get(index).ok_or_else(|| out_of_range(index))
    }

    /// Payload of any slot.
    pub fn payload(&self, index: usize) -> KernelResult<&Payload> {
        self.slot(index)?.payload(index)
    }

    /// Mutable payload of a written slot.
    pub fn payload_mut(&mut self, index: usize) -> KernelResult<&mut Payload> {
        self.slots
            .get_mut(index)
            .ok_or_else(|| out_of_range(index))?
            .payload_mut(index)
    }

    /// Image bound to a slot.
    pub fn image(&self, index: usize) -> KernelResult<&ImageBuffer> {
        let payload = self.payload(index)?;
        payload.as_image().ok_or_else(|| wrong_kind(index, "image", payload))
    }

    /// Mutable image bound to a written slot.
    pub fn image_mut(&mut self, index: usize) -> KernelResult<&mut ImageBuffer> {
        let payload = self.payload_mut(index)?;
        let kind = payload.kind();
        payload.as_image_mut().ok_or_else(|| {
            KernelError::invalid_parameters(format!(
                "parameter {} is {}, expected image",
                index, kind
            ))
        })
    }

    /// Scalar bound to a slot.
    pub fn scalar(&self, index: usize) -> KernelResult<ScalarValue> {
        let payload = self.payload(index)?;
        payload
            .as_scalar()
            .ok_or_else(|| wrong_kind(index, "scalar", payload))
    }

    /// Store a scalar into a written slot; the type must match.
    pub fn set_scalar(&mut self, index: usize, value: ScalarValue) -> KernelResult<()> {
        let payload = self.payload_mut(index)?;
        match payload {
            Payload::Scalar(current) if current.scalar_type() == value.scalar_type() => {
                *current = value;
                Ok(())
            }
            other => Err(wrong_kind(index, &format!("scalar {}", value.scalar_type()), other)),
        }
    }

    /// Array bound to a slot.
    pub fn array(&self, index: usize) -> KernelResult<&ArrayBuffer> {
        let payload = self.payload(index)?;
        payload.as_array().ok_or_else(|| wrong_kind(index, "array", payload))
    }

    /// Mutable array bound to a written slot.
    pub fn array_mut(&mut self, index: usize) -> KernelResult<&mut ArrayBuffer> {
        let payload = self.payload_mut(index)?;
        let kind = payload.kind();
        payload.as_array_mut().ok_or_else(|| {
            KernelError::invalid_parameters(format!(
                "parameter {} is {}, expected array",
                index, kind
            ))
        })
    }

    /// Borrow several read slots and one written slot at once.
    pub fn split(
        &mut self,
        reads: &[usize],
        write: usize,
    ) -> KernelResult<(Vec<&Payload>, &mut Payload)> {
        let count = self.slots.len();
        if write >= count {
            return Err(out_of_range(write));
        }
        if let Some(&bad) = reads.iter().find(|&&r| r >= count) {
            return Err(out_of_range(bad));
        }
        if reads.contains(&write) {
            return Err(KernelError::new(
                KernelError::INVALID_ACCESS,
                format!("parameter {} cannot be read and written at once", write),
            ));
        }

        let mut inputs: Vec<Option<&Payload>> = vec![None; reads.len()];
        let mut output = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if index == write {
                output = Some(slot.payload_mut(index)?);
            } else if reads.contains(&index) {
                let slot: &SlotGuard<'a> = slot;
                let payload = slot.payload(index)?;
                for (position, &r) in reads.iter().enumerate() {
                    if r == index {
                        inputs[position] = Some(payload);
                    }
                }
            }
        }

        let output = output.ok_or_else(|| out_of_range(write))?;
        Ok((inputs.into_iter().flatten().collect(), output))
    }

    /// Borrow one input image and one output image.
    pub fn unary_image(
        &mut self,
        input: usize,
        output: usize,
    ) -> KernelResult<(&ImageBuffer, &mut ImageBuffer)> {
        let (inputs, out) = self.split(&[input], output)?;
        let src = inputs[0]
            .as_image()
            .ok_or_else(|| wrong_kind(input, "image", inputs[0]))?;
        let kind = out.kind();
        let dst = out.as_image_mut().ok_or_else(|| {
            KernelError::invalid_parameters(format!(
                "parameter {} is {}, expected image",
                output, kind
            ))
        })?;
        Ok((src, dst))
    }

    /// Borrow two input images and one output image.
    pub fn binary_image(
        &mut self,
        a: usize,
        b: usize,
        output: usize,
    ) -> KernelResult<(&ImageBuffer, &ImageBuffer, &mut ImageBuffer)> {
        let (inputs, out) = self.split(&[a, b], output)?;
        let first = inputs[0]
            .as_image()
            .ok_or_else(|| wrong_kind(a, "image", inputs[0]))?;
        let second = inputs[1]
            .as_image()
            .ok_or_else(|| wrong_kind(b, "image", inputs[1]))?;
        let kind = out.kind();
        let dst = out.as_image_mut().ok_or_else(|| {
            KernelError::invalid_parameters(format!(
                "parameter {} is {}, expected image",
                output, kind
            ))
        })?;
        Ok((first, second, dst))
    }
}

fn out_of_range(index: usize) -> KernelError {
    KernelError::invalid_parameters(format!("parameter {} does not exist", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::DataArena;
    use crate::core::error::GraphId;
    use crate::core::types::ScalarType;

    #[test]
    fn test_split_borrows_inputs_and_output() {
        let mut arena = DataArena::new(GraphId::new());
        let a = arena.create(DataDesc::image(2, 1, ImageFormat::U8)).unwrap();
        let b = arena.create(DataDesc::image(2, 1, ImageFormat::U8)).unwrap();
        if let Some(Payload::Image(image)) = arena.get(a).unwrap().write().as_mut() {
            image.data = vec![7, 9];
        }

        let bindings = vec![
            (arena.get(a).unwrap(), Direction::Input),
            (arena.get(b).unwrap(), Direction::Output),
        ];
        let mut ctx = ExecutionContext::bind(NodeId(0), bindings);
        let (src, dst) = ctx.unary_image(0, 1).unwrap();
        dst.data.copy_from_slice(&src.data);
        drop(ctx);

        let payload = arena.get(b).unwrap().read();
        assert_eq!(payload.as_ref().and_then(Payload::as_image).unwrap().data, vec![7, 9]);
    }

    #[test]
    fn test_input_slot_is_read_only() {
        let mut arena = DataArena::new(GraphId::new());
        let s = arena.create(DataDesc::scalar(ScalarType::U32)).unwrap();
        let mut ctx = ExecutionContext::bind(NodeId(0), vec![(arena.get(s).unwrap(), Direction::Input)]);

        assert_eq!(ctx.scalar(0).unwrap(), ScalarValue::U32(0));
        let err = ctx.set_scalar(0, ScalarValue::U32(5)).unwrap_err();
        assert_eq!(err.code, KernelError::INVALID_ACCESS);
        assert!(ctx.payload(3).is_err());
    }

    #[test]
    fn test_set_scalar_checks_type() {
        let mut arena = DataArena::new(GraphId::new());
        let s = arena.create(DataDesc::scalar(ScalarType::U32)).unwrap();
        let mut ctx = ExecutionContext::bind(NodeId(0), vec![(arena.get(s).unwrap(), Direction::Output)]);

        assert!(ctx.set_scalar(0, ScalarValue::I16(1)).is_err());
        ctx.set_scalar(0, ScalarValue::U32(42)).unwrap();
        assert_eq!(ctx.scalar(0).unwrap(), ScalarValue::U32(42));
    }

    #[test]
    fn test_validation_context_inputs() {
        let metadata = Arc::new(
            KernelMetadata::builder("org.example.k")
                .input("in", crate::core::types::TypeConstraint::AnyImage)
                .output("out", crate::core::types::TypeConstraint::AnyImage)
                .build(),
        );
        let desc = DataDesc::image(4, 4, ImageFormat::U8);
        let ctx = ValidationContext::new(NodeId(1), metadata, vec![Some(desc), None], vec![None, None]);
        assert_eq!(ctx.kernel_name(), "org.example.k");
        assert_eq!(ctx.first_input_image(), Some(desc));
        assert_eq!(ctx.dimensions(0).unwrap(), (4, 4));
        assert!(ctx.dimensions(1).is_err());
    }
}
