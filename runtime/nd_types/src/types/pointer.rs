//! `pointer[T]` and `void_pointer`: data holding the address of a value
//! that lives in another memory block.

use std::any::Any;
use std::fmt;
use std::mem::size_of;
use std::ptr;

use nd_ckernel::{
    make_kernreq_to_single_kernel_adapter, make_pod_assignment_kernel, AssignErrorMode, ConversionError,
    ConversionErrorKind, KernelBuilder, KernelOp, KernelPrefix, KernelRecord, KernelRequest,
};
use nd_memblock::MemoryBlockRef;

use crate::assign::compile_assignment;
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[repr(C)]
#[derive(Debug, Default)]
pub struct PointerMeta {
    /// Block the target lives in.
    pub blockref: Option<MemoryBlockRef>,
    /// Byte offset applied to the stored address.
    pub offset: isize,
}

const META: usize = size_of::<PointerMeta>();

unsafe fn construct_meta(metadata: *mut u8) {
    metadata.cast::<PointerMeta>().write(PointerMeta::default());
}

unsafe fn copy_meta(dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
    let src_meta = &*src.cast::<PointerMeta>();
    dst.cast::<PointerMeta>().write(PointerMeta {
        blockref: src_meta.blockref.clone().or_else(|| embedded.cloned()),
        offset: src_meta.offset,
    });
}

unsafe fn destruct_meta(metadata: *mut u8) {
    (*metadata.cast::<PointerMeta>()).blockref = None;
}

/// An untyped address; the operand of every `pointer[T]`.
#[derive(Debug, Default)]
pub struct VoidPointerType;

pub fn make_void_pointer() -> NdType {
    NdType::new(VoidPointerType)
}

impl ExtendedType for VoidPointerType {
    fn type_id(&self) -> TypeId {
        TypeId::VoidPointer
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Pointer
    }

    fn data_size(&self) -> usize {
        size_of::<*const u8>()
    }

    fn alignment(&self) -> usize {
        size_of::<*const u8>()
    }

    fn metadata_size(&self) -> usize {
        META
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::ZEROINIT | TypeFlags::BLOCKREF
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other.as_any().is::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, _shape: &[usize]) -> Result<(), NdError> {
        construct_meta(metadata);
        Ok(())
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        copy_meta(dst, src, embedded);
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        destruct_meta(metadata);
    }

    fn make_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_tp: &NdType,
        _dst_md: *const u8,
        src_tp: &NdType,
        _src_md: *const u8,
        request: KernelRequest,
        _errmode: AssignErrorMode,
        _ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        if dst_tp.type_id() == TypeId::VoidPointer && src_tp.type_id() == TypeId::VoidPointer {
            return Ok(make_pod_assignment_kernel(ckb, offset, self.data_size(), self.alignment(), request)?);
        }
        Err(NdError::incompatible(dst_tp, src_tp))
    }
}

impl fmt::Display for VoidPointerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pointer[void]")
    }
}

/// Reads dereference the stored address; assigning a value stores it at
/// that address.
#[derive(Debug)]
pub struct PointerType {
    target: NdType,
    operand: NdType,
}

impl PointerType {
    pub fn target_type(&self) -> &NdType {
        &self.target
    }
}

pub fn make_pointer(target: &NdType) -> NdType {
    NdType::new(PointerType {
        target: target.clone(),
        operand: make_void_pointer(),
    })
}

impl ExtendedType for PointerType {
    fn type_id(&self) -> TypeId {
        TypeId::Pointer
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Expression
    }

    fn data_size(&self) -> usize {
        size_of::<*const u8>()
    }

    fn alignment(&self) -> usize {
        size_of::<*const u8>()
    }

    fn metadata_size(&self) -> usize {
        META + self.target.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        TypeFlags::ZEROINIT
            | TypeFlags::BLOCKREF
            | TypeFlags::EXPRESSION
            | TypeFlags::propagate_from(self.target.flags())
    }

    fn ndim(&self) -> usize {
        self.target.ndim()
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.target == self.target)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> Option<&NdType> {
        Some(&self.target)
    }

    fn operand_type(&self) -> Option<&NdType> {
        Some(&self.operand)
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        construct_meta(metadata);
        self.target.metadata_default_construct(metadata.add(META), shape)
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        copy_meta(dst, src, embedded);
        self.target
            .metadata_copy_construct(dst.add(META), src.add(META), embedded);
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        self.target.metadata_reset_buffers(metadata.add(META));
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        destruct_meta(metadata);
        self.target.metadata_destruct(metadata.add(META));
    }

    fn make_operand_to_value_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_md: *const u8,
        src_md: *const u8,
        request: KernelRequest,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let child = ckb.emplace(
            at,
            DerefKernel {
                base: KernelPrefix::new(KernelOp::Single(deref_single), Some(deref_destruct)),
                meta: src_md.cast(),
            },
        )?;
        ckb.ensure_capacity_leaf(child)?;
        compile_assignment(
            ckb,
            child,
            &self.target,
            dst_md,
            &self.target,
            // SAFETY: pointer metadata is followed by the target's.
            unsafe { src_md.add(META) },
            KernelRequest::Single,
            AssignErrorMode::None,
            ectx,
        )
    }

    fn make_value_to_operand_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_md: *const u8,
        src_md: *const u8,
        request: KernelRequest,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let child = ckb.emplace(
            at,
            DerefKernel {
                base: KernelPrefix::new(KernelOp::Single(store_single), Some(deref_destruct)),
                meta: dst_md.cast(),
            },
        )?;
        ckb.ensure_capacity_leaf(child)?;
        compile_assignment(
            ckb,
            child,
            &self.target,
            // SAFETY: pointer metadata is followed by the target's.
            unsafe { dst_md.add(META) },
            &self.target,
            src_md,
            KernelRequest::Single,
            AssignErrorMode::None,
            ectx,
        )
    }
}

impl fmt::Display for PointerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pointer[{}]", self.target)
    }
}

/// Reads through the pointer on the source side, or stores through the one
/// on the destination side.
#[repr(C)]
struct DerefKernel {
    base: KernelPrefix,
    meta: *const PointerMeta,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for DerefKernel {}

const DEREF_CHILD: usize = size_of::<DerefKernel>();

unsafe fn target_of(data: *const u8, ckp: *mut KernelPrefix) -> Result<*const u8, ConversionError> {
    let address = data.cast::<*const u8>().read_unaligned();
    if address.is_null() {
        return Err(ConversionError::new(
            ConversionErrorKind::NullPointer,
            "pointer has no target",
        ));
    }
    let meta = &*(*ckp.cast::<DerefKernel>()).meta;
    Ok(address.wrapping_offset(meta.offset))
}

unsafe fn deref_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let target = target_of(src, ckp)?;
    KernelPrefix::call_single(KernelPrefix::child(ckp, DEREF_CHILD), dst, target)
}

unsafe fn store_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let target = target_of(dst, ckp)?.cast_mut();
    KernelPrefix::call_single(KernelPrefix::child(ckp, DEREF_CHILD), target, src)
}

unsafe fn deref_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, DEREF_CHILD);
}

/// Store `target` as the address held by pointer data at `data`.
///
/// # Safety
///
/// `data` must be writable pointer data.
pub(crate) unsafe fn write_address(data: *mut u8, target: *const u8) {
    ptr::write_unaligned(data.cast::<*const u8>(), target);
}
