//! `strided * T`: a dimension whose size and stride live in metadata.

use std::any::Any;
use std::fmt;
use std::mem::size_of;

use nd_ckernel::{AssignErrorMode, KernelBuilder, KernelRequest};
use nd_memblock::MemoryBlockRef;

use super::{dims_lossless, make_dim_assignment_kernel};
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StridedDimMeta {
    pub size: usize,
    pub stride: isize,
}

#[derive(Debug)]
pub struct StridedDimType {
    element: NdType,
}

impl StridedDimType {
    pub fn element_type(&self) -> &NdType {
        &self.element
    }
}

pub fn make_strided_dim(element: &NdType) -> NdType {
    NdType::new(StridedDimType {
        element: element.clone(),
    })
}

/// `ndim` nested strided dimensions around `element`.
pub fn make_strided_dim_n(ndim: usize, element: &NdType) -> NdType {
    (0..ndim).fold(element.clone(), |tp, _| make_strided_dim(&tp))
}

impl ExtendedType for StridedDimType {
    fn type_id(&self) -> TypeId {
        TypeId::StridedDim
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Dim
    }

    fn data_size(&self) -> usize {
        0
    }

    fn alignment(&self) -> usize {
        self.element.alignment()
    }

    fn metadata_size(&self) -> usize {
        size_of::<StridedDimMeta>() + self.element.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::propagate_from(self.element.flags())
    }

    fn ndim(&self) -> usize {
        1 + self.element.ndim()
    }

    fn default_data_size(&self, shape: &[usize]) -> Option<usize> {
        match shape.split_first() {
            Some((&size, rest)) => size.checked_mul(self.element.default_data_size(rest)?),
            None => Some(0),
        }
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.element == self.element)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_lossless_assignment(&self, dst: &NdType, src: &NdType) -> bool {
        dims_lossless(dst, src)
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        let Some((&size, rest)) = shape.split_first() else {
            return Err(NdError::layout(format!("{self} needs a size for its dimension")));
        };
        let stride = self
            .element
            .default_data_size(rest)
            .and_then(|bytes| isize::try_from(bytes).ok())
            .ok_or_else(|| NdError::layout(format!("{self} with shape {shape:?} overflows its stride")))?;
        metadata.cast::<StridedDimMeta>().write(StridedDimMeta { size, stride });
        self.element
            .metadata_default_construct(metadata.add(size_of::<StridedDimMeta>()), rest)
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        dst.cast::<StridedDimMeta>().write(*src.cast::<StridedDimMeta>());
        self.element.metadata_copy_construct(
            dst.add(size_of::<StridedDimMeta>()),
            src.add(size_of::<StridedDimMeta>()),
            embedded,
        );
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        self.element
            .metadata_reset_buffers(metadata.add(size_of::<StridedDimMeta>()));
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        self.element.metadata_destruct(metadata.add(size_of::<StridedDimMeta>()));
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

impl fmt::Display for StridedDimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strided * {}", self.element)
    }
}
