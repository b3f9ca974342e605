//! `N * T`: a dimension whose size is part of the type.

use std::any::Any;
use std::fmt;

use nd_ckernel::{AssignErrorMode, KernelBuilder, KernelRequest};
use nd_memblock::MemoryBlockRef;

use super::{dims_lossless, make_dim_assignment_kernel};
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

/// Elements are contiguous, so the stride is the element size and the
/// metadata is the element's, shared by every element.
#[derive(Debug)]
pub struct FixedDimType {
    size: usize,
    stride: usize,
    element: NdType,
}

impl FixedDimType {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_type(&self) -> &NdType {
        &self.element
    }
}

pub fn make_fixed_dim(size: usize, element: &NdType) -> Result<NdType, NdError> {
    let stride = element.data_size();
    if stride == 0 {
        return Err(NdError::construction(format!(
            "fixed dimension element {element} has no fixed size"
        )));
    }
    let fits = size
        .checked_mul(stride)
        .and_then(|bytes| isize::try_from(bytes).ok())
        .is_some();
    if !fits {
        return Err(NdError::construction(format!(
            "fixed dimension of {size} x {element} overflows its data size"
        )));
    }
    Ok(NdType::new(FixedDimType {
        size,
        stride,
        element: element.clone(),
    }))
}

impl ExtendedType for FixedDimType {
    fn type_id(&self) -> TypeId {
        TypeId::FixedDim
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Dim
    }

    fn data_size(&self) -> usize {
        self.size * self.stride
    }

    fn alignment(&self) -> usize {
        self.element.alignment()
    }

    fn metadata_size(&self) -> usize {
        self.element.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::propagate_from(self.element.flags())
    }

    fn ndim(&self) -> usize {
        1 + self.element.ndim()
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.size == self.size && o.element == self.element)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_lossless_assignment(&self, dst: &NdType, src: &NdType) -> bool {
        dims_lossless(dst, src)
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        self.element
            .metadata_default_construct(metadata, shape.get(1..).unwrap_or_default())
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        self.element.metadata_copy_construct(dst, src, embedded);
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        self.element.metadata_reset_buffers(metadata);
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        self.element.metadata_destruct(metadata);
    }

    fn make_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_tp: &NdType,
        dst_md: *const u8,
        src_tp: &NdType,
        src_md: *const u8,
        request: KernelRequest,
        errmode: AssignErrorMode,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        make_dim_assignment_kernel(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx)
    }
}

impl fmt::Display for FixedDimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} * {}", self.size, self.element)
    }
}
