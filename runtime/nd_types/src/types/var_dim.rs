//! `var * T`: a dimension whose size is stored with each element.
//!
//! Element data holds a `(begin, size)` pair pointing into a pod block owned
//! by the metadata. Assigning into an element whose `begin` is null
//! allocates its storage from that block; assigning into an already
//! allocated element requires the sizes to agree.

use std::any::Any;
use std::fmt;
use std::mem::size_of;

use nd_ckernel::{
    make_kernreq_to_single_kernel_adapter, AssignErrorMode, ConversionError, ConversionErrorKind, KernelBuilder,
    KernelOp, KernelPrefix, KernelRecord, KernelRequest,
};
use nd_memblock::MemoryBlockRef;

use super::{dim_view, dims_lossless};
use crate::assign::compile_assignment;
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[repr(C)]
#[derive(Debug)]
pub struct VarDimMeta {
    /// Pod block the element storage is allocated from.
    pub blockref: Option<MemoryBlockRef>,
    pub stride: isize,
    /// Byte offset applied to every element's `begin`.
    pub offset: isize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct VarDimData {
    pub begin: *mut u8,
    pub size: usize,
}

const META: usize = size_of::<VarDimMeta>();

#[derive(Debug)]
pub struct VarDimType {
    element: NdType,
}

impl VarDimType {
    pub fn element_type(&self) -> &NdType {
        &self.element
    }
}

pub fn make_var_dim(element: &NdType) -> Result<NdType, NdError> {
    if element.data_size() == 0 {
        return Err(NdError::construction(format!(
            "var dimension element {element} has no fixed size"
        )));
    }
    Ok(NdType::new(VarDimType {
        element: element.clone(),
    }))
}

impl ExtendedType for VarDimType {
    fn type_id(&self) -> TypeId {
        TypeId::VarDim
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Dim
    }

    fn data_size(&self) -> usize {
        size_of::<VarDimData>()
    }

    fn alignment(&self) -> usize {
        8
    }

    fn metadata_size(&self) -> usize {
        META + self.element.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::ZEROINIT | TypeFlags::BLOCKREF | TypeFlags::propagate_from(self.element.flags())
    }

    fn ndim(&self) -> usize {
        1 + self.element.ndim()
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
        metadata.cast::<VarDimMeta>().write(VarDimMeta {
            blockref: Some(MemoryBlockRef::new_pod()?),
            stride: self.element.data_size() as isize,
            offset: 0,
        });
        self.element
            .metadata_default_construct(metadata.add(META), shape.get(1..).unwrap_or_default())
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        let src_meta = &*src.cast::<VarDimMeta>();
        dst.cast::<VarDimMeta>().write(VarDimMeta {
            blockref: src_meta.blockref.clone().or_else(|| embedded.cloned()),
            stride: src_meta.stride,
            offset: src_meta.offset,
        });
        self.element
            .metadata_copy_construct(dst.add(META), src.add(META), embedded);
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        if let Some(block) = &(*metadata.cast::<VarDimMeta>()).blockref {
            if let Err(err) = block.pod_reset() {
                tracing::trace!(%err, "var dimension storage is not resettable");
            }
        }
        self.element.metadata_reset_buffers(metadata.add(META));
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        (*metadata.cast::<VarDimMeta>()).blockref = None;
        self.element.metadata_destruct(metadata.add(META));
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
        let Some(dst_var) = dst_tp.downcast::<VarDimType>() else {
            return Err(NdError::broadcast(dst_tp, src_tp));
        };
        if src_tp.ndim() > dst_tp.ndim() {
            return Err(NdError::broadcast(dst_tp, src_tp));
        }
        // SAFETY: compile callers pass metadata constructed for their types.
        let dst_meta = unsafe { &*dst_md.cast::<VarDimMeta>() };
        if dst_meta.offset != 0 {
            return Err(NdError::layout(format!(
                "{dst_tp} destination has a nonzero element offset {}",
                dst_meta.offset
            )));
        }
        if dst_meta.blockref.is_none() {
            return Err(NdError::layout(format!("{dst_tp} destination has no memory block")));
        }

        let (source, src_element_tp, src_element_md) = if src_tp.ndim() < dst_tp.ndim() {
            (VarSource::Scalar, src_tp, src_md)
        } else if let Some(src_var) = src_tp.downcast::<VarDimType>() {
            // SAFETY: var metadata starts with its own header.
            (VarSource::Var(src_md.cast()), src_var.element_type(), unsafe { src_md.add(META) })
        } else if let Some(view) = unsafe { dim_view(src_tp, src_md) } {
            (
                VarSource::Static {
                    size: view.size,
                    stride: view.stride,
                },
                view.element_tp,
                view.element_md,
            )
        } else {
            return Err(NdError::broadcast(dst_tp, src_tp));
        };

        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let child = ckb.emplace(
            at,
            VarAssignKernel {
                base: KernelPrefix::new(KernelOp::Single(var_assign_single), Some(var_assign_destruct)),
                dst_meta: dst_md.cast(),
                element_align: dst_var.element.alignment(),
                source,
            },
        )?;
        ckb.ensure_capacity_leaf(child)?;
        compile_assignment(
            ckb,
            child,
            &dst_var.element,
            // SAFETY: as above.
            unsafe { dst_md.add(META) },
            src_element_tp,
            src_element_md,
            KernelRequest::Strided,
            errmode,
            ectx,
        )
    }
}

impl fmt::Display for VarDimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var * {}", self.element)
    }
}

#[derive(Clone, Copy)]
enum VarSource {
    Var(*const VarDimMeta),
    Static { size: usize, stride: isize },
    Scalar,
}

#[repr(C)]
struct VarAssignKernel {
    base: KernelPrefix,
    dst_meta: *const VarDimMeta,
    element_align: usize,
    source: VarSource,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for VarAssignKernel {}

const ASSIGN_CHILD: usize = size_of::<VarAssignKernel>();

#[cold]
fn size_mismatch(dst: usize, src: usize) -> ConversionError {
    ConversionError::new(
        ConversionErrorKind::DimensionMismatch,
        format!("cannot broadcast var dimension of size {src} to size {dst}"),
    )
}

/// Allocate `count` elements for an unallocated var element.
unsafe fn allocate_elements(meta: &VarDimMeta, data: &mut VarDimData, count: usize, align: usize) -> Result<(), ConversionError> {
    let Some(block) = &meta.blockref else {
        return Err(ConversionError::new(
            ConversionErrorKind::AllocationFailed,
            "var dimension has no memory block",
        ));
    };
    let bytes = count * meta.stride.unsigned_abs();
    let begin = block
        .pod_allocate(bytes, align)
        .map_err(|err| ConversionError::new(ConversionErrorKind::AllocationFailed, err.to_string()))?;
    data.begin = begin.as_ptr();
    data.size = count;
    Ok(())
}

unsafe fn var_assign_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<VarAssignKernel>();
    let meta = &*e.dst_meta;
    let dst_data = &mut *dst.cast::<VarDimData>();

    let (src_begin, src_size, src_stride) = match e.source {
        VarSource::Var(src_meta) => {
            let src_meta = &*src_meta;
            let src_data = &*src.cast::<VarDimData>();
            (
                src_data.begin.cast_const().wrapping_offset(src_meta.offset),
                src_data.size,
                src_meta.stride,
            )
        }
        VarSource::Static { size, stride } => (src, size, stride),
        VarSource::Scalar => (src, 1, 0),
    };

    if dst_data.begin.is_null() {
        allocate_elements(meta, dst_data, src_size, e.element_align)?;
    }
    let count = dst_data.size;
    let src_stride = if src_size == count {
        src_stride
    } else if src_size == 1 {
        0
    } else {
        return Err(size_mismatch(count, src_size));
    };
    KernelPrefix::call_strided(
        KernelPrefix::child(ckp, ASSIGN_CHILD),
        dst_data.begin,
        meta.stride,
        src_begin,
        src_stride,
        count,
    )
}

unsafe fn var_assign_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, ASSIGN_CHILD);
}

#[repr(C)]
struct VarToStaticKernel {
    base: KernelPrefix,
    size: usize,
    dst_stride: isize,
    src_meta: *const VarDimMeta,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for VarToStaticKernel {}

const STATIC_CHILD: usize = size_of::<VarToStaticKernel>();

unsafe fn var_to_static_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<VarToStaticKernel>();
    let src_meta = &*e.src_meta;
    let src_data = &*src.cast::<VarDimData>();
    let src_stride = if src_data.size == e.size {
        src_meta.stride
    } else if src_data.size == 1 {
        0
    } else {
        return Err(size_mismatch(e.size, src_data.size));
    };
    KernelPrefix::call_strided(
        KernelPrefix::child(ckp, STATIC_CHILD),
        dst,
        e.dst_stride,
        src_data.begin.cast_const().wrapping_offset(src_meta.offset),
        src_stride,
        e.size,
    )
}

unsafe fn var_to_static_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, STATIC_CHILD);
}

/// Strided or fixed destination, var source of the same rank.
#[expect(clippy::too_many_arguments, reason = "forwards compile_assignment")]
pub(super) fn make_var_to_static_kernel(
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
    // SAFETY: compile callers pass metadata constructed for their types.
    let (Some(dst), Some(src_var)) = (unsafe { dim_view(dst_tp, dst_md) }, src_tp.downcast::<VarDimType>()) else {
        return Err(NdError::broadcast(dst_tp, src_tp));
    };
    let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
    let child = ckb.emplace(
        at,
        VarToStaticKernel {
            base: KernelPrefix::new(KernelOp::Single(var_to_static_single), Some(var_to_static_destruct)),
            size: dst.size,
            dst_stride: dst.stride,
            src_meta: src_md.cast(),
        },
    )?;
    ckb.ensure_capacity_leaf(child)?;
    compile_assignment(
        ckb,
        child,
        dst.element_tp,
        dst.element_md,
        &src_var.element,
        // SAFETY: var metadata starts with its own header.
        unsafe { src_md.add(META) },
        KernelRequest::Strided,
        errmode,
        ectx,
    )
}

#[cfg(test)]
mod tests;
