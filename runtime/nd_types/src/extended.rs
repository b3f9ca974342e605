//! The interface every non-builtin type implements.

use std::any::Any;
use std::fmt;

use nd_ckernel::{AssignErrorMode, KernelBuilder, KernelRequest};
use nd_memblock::MemoryBlockRef;

use crate::{EvalContext, NdError, NdType, TypeFlags, TypeId, TypeKind};

/// Behavior of an extended type.
///
/// Instances are shared behind [`NdType`] handles and never mutated after
/// construction.
///
/// # Metadata
///
/// A type with `metadata_size() > 0` describes per-array state (dimension
/// sizes, strides, owning block references) laid out in an 8-aligned byte
/// region. All-zero bytes must be a valid "empty" state for that region:
/// destruct runs on zeroed or partially constructed metadata after a failed
/// construction.
///
/// # Assignment
///
/// [`make_assignment_kernel`](ExtendedType::make_assignment_kernel) is called
/// on the destination type first, and on the source type when the
/// destination is builtin. Expression types are routed through their
/// operand/value conversion hooks instead.
pub trait ExtendedType: Send + Sync + fmt::Debug + fmt::Display {
    fn type_id(&self) -> TypeId;

    fn kind(&self) -> TypeKind;

    /// Bytes per element; 0 when the size depends on metadata.
    fn data_size(&self) -> usize;

    fn alignment(&self) -> usize;

    fn metadata_size(&self) -> usize {
        0
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::empty()
    }

    /// Number of array dimensions this type contributes, including nested
    /// element types.
    fn ndim(&self) -> usize {
        0
    }

    /// Data size of a freshly allocated array with this type and `shape`,
    /// or `None` when it overflows `usize`.
    fn default_data_size(&self, _shape: &[usize]) -> Option<usize> {
        Some(self.data_size())
    }

    /// Parameter equality against another type with the same [`TypeId`].
    fn equals(&self, other: &dyn ExtendedType) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// Logical type of the value an expression produces.
    fn value_type(&self) -> Option<&NdType> {
        None
    }

    /// Type of the stored representation an expression reads and writes.
    fn operand_type(&self) -> Option<&NdType> {
        None
    }

    /// Whether every `src` value assigns to `dst` without loss.
    fn is_lossless_assignment(&self, _dst: &NdType, _src: &NdType) -> bool {
        false
    }

    /// Construct metadata for a fresh array of `shape`.
    ///
    /// # Safety
    ///
    /// `metadata` must point at `metadata_size()` zeroed, 8-aligned bytes.
    unsafe fn metadata_default_construct(&self, _metadata: *mut u8, _shape: &[usize]) -> Result<(), NdError> {
        Ok(())
    }

    /// Copy metadata for a new view. Block references missing from `src` are
    /// filled from `embedded`, the block holding the view's data.
    ///
    /// # Safety
    ///
    /// `dst` must be zeroed and `src` constructed, both for this type.
    unsafe fn metadata_copy_construct(&self, _dst: *mut u8, _src: *const u8, _embedded: Option<&MemoryBlockRef>) {}

    /// Release temporary allocations referenced by the metadata, keeping it
    /// usable. Called after every use of a scratch buffer.
    ///
    /// # Safety
    ///
    /// `metadata` must be constructed for this type and no data may still
    /// point into the released allocations.
    unsafe fn metadata_reset_buffers(&self, _metadata: *const u8) {}

    /// # Safety
    ///
    /// `metadata` must be zeroed, partially or fully constructed for this type.
    unsafe fn metadata_destruct(&self, _metadata: *mut u8) {}

    /// Emit a kernel assigning `src_tp` data to `dst_tp` data at `offset`.
    /// Returns the offset just past everything emitted.
    #[expect(clippy::too_many_arguments, reason = "mirrors the compile entry point")]
    fn make_assignment_kernel(
        &self,
        _ckb: &mut KernelBuilder,
        _offset: usize,
        dst_tp: &NdType,
        _dst_md: *const u8,
        src_tp: &NdType,
        _src_md: *const u8,
        _request: KernelRequest,
        _errmode: AssignErrorMode,
        _ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        Err(NdError::incompatible(dst_tp, src_tp))
    }

    /// Expression types: kernel from operand data to value data.
    fn make_operand_to_value_assignment_kernel(
        &self,
        _ckb: &mut KernelBuilder,
        _offset: usize,
        _dst_md: *const u8,
        _src_md: *const u8,
        _request: KernelRequest,
        _ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        Err(NdError::IncompatibleTypes {
            dst: "value".to_owned(),
            src: self.to_string(),
        })
    }

    /// Expression types: kernel from value data back to operand data.
    fn make_value_to_operand_assignment_kernel(
        &self,
        _ckb: &mut KernelBuilder,
        _offset: usize,
        _dst_md: *const u8,
        _src_md: *const u8,
        _request: KernelRequest,
        _ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        Err(NdError::IncompatibleTypes {
            dst: self.to_string(),
            src: "value".to_owned(),
        })
    }
}
