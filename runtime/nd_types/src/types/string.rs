//! `string`: UTF-8 bytes stored out of line in a pod block.

use std::any::Any;
use std::fmt;
use std::mem::size_of;
use std::ptr;

use nd_ckernel::{
    make_kernreq_to_single_kernel_adapter, AssignErrorMode, ConversionError, ConversionErrorKind, KernelBuilder,
    KernelOp, KernelPrefix, KernelRecord, KernelRequest,
};
use nd_memblock::MemoryBlockRef;

use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[repr(C)]
#[derive(Debug, Default)]
pub struct StringMeta {
    /// Pod block string bytes are allocated from.
    pub blockref: Option<MemoryBlockRef>,
}

/// A null `begin` is the empty string.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct StringData {
    pub begin: *mut u8,
    pub end: *mut u8,
}

#[derive(Debug, Default)]
pub struct StringType;

pub fn make_string() -> NdType {
    NdType::new(StringType)
}

/// Bytes of the string at `data`.
///
/// # Safety
///
/// `data` must point at string data whose bytes are still allocated.
pub unsafe fn string_bytes<'a>(data: *const u8) -> &'a [u8] {
    let d = &*data.cast::<StringData>();
    if d.begin.is_null() {
        return &[];
    }
    std::slice::from_raw_parts(d.begin, d.end as usize - d.begin as usize)
}

/// Copy `bytes` into the block named by `metadata` and point `data` at them.
///
/// # Safety
///
/// `metadata` must be constructed string metadata and `data` writable string
/// data.
pub unsafe fn write_string(metadata: *const u8, data: *mut u8, bytes: &[u8]) -> Result<(), ConversionError> {
    let meta = &*metadata.cast::<StringMeta>();
    let Some(block) = &meta.blockref else {
        return Err(ConversionError::new(
            ConversionErrorKind::AllocationFailed,
            "string destination has no memory block",
        ));
    };
    let begin = block
        .pod_allocate(bytes.len(), 1)
        .map_err(|err| ConversionError::new(ConversionErrorKind::AllocationFailed, err.to_string()))?
        .as_ptr();
    ptr::copy_nonoverlapping(bytes.as_ptr(), begin, bytes.len());
    data.cast::<StringData>().write(StringData {
        begin,
        end: begin.add(bytes.len()),
    });
    Ok(())
}

impl ExtendedType for StringType {
    fn type_id(&self) -> TypeId {
        TypeId::String
    }

    fn kind(&self) -> TypeKind {
        TypeKind::String
    }

    fn data_size(&self) -> usize {
        size_of::<StringData>()
    }

    fn alignment(&self) -> usize {
        8
    }

    fn metadata_size(&self) -> usize {
        size_of::<StringMeta>()
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

    fn is_lossless_assignment(&self, dst: &NdType, src: &NdType) -> bool {
        dst.type_id() == TypeId::String && src.type_id() == TypeId::String
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, _shape: &[usize]) -> Result<(), NdError> {
        metadata.cast::<StringMeta>().write(StringMeta {
            blockref: Some(MemoryBlockRef::new_pod()?),
        });
        Ok(())
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        let src_meta = &*src.cast::<StringMeta>();
        dst.cast::<StringMeta>().write(StringMeta {
            blockref: src_meta.blockref.clone().or_else(|| embedded.cloned()),
        });
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        if let Some(block) = &(*metadata.cast::<StringMeta>()).blockref {
            if let Err(err) = block.pod_reset() {
                tracing::trace!(%err, "string storage is not resettable");
            }
        }
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        (*metadata.cast::<StringMeta>()).blockref = None;
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
        if dst_tp.type_id() != TypeId::String {
            return Err(NdError::incompatible(dst_tp, src_tp));
        }
        if src_tp.type_id() != TypeId::String {
            // Other string-like sources (categoricals over strings) know how.
            return match src_tp {
                NdType::Extended(src) => {
                    src.make_assignment_kernel(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx)
                }
                NdType::Builtin(_) => Err(NdError::incompatible(dst_tp, src_tp)),
            };
        }
        // SAFETY: compile callers pass metadata constructed for their types.
        if unsafe { (*dst_md.cast::<StringMeta>()).blockref.is_none() } {
            return Err(NdError::layout("string destination has no memory block"));
        }
        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        Ok(ckb.emplace(
            at,
            StringCopyKernel {
                base: KernelPrefix::new(KernelOp::Single(string_copy_single), None),
                dst_meta: dst_md,
            },
        )?)
    }
}

impl fmt::Display for StringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("string")
    }
}

#[repr(C)]
struct StringCopyKernel {
    base: KernelPrefix,
    dst_meta: *const u8,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for StringCopyKernel {}

unsafe fn string_copy_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<StringCopyKernel>();
    write_string(e.dst_meta, dst, string_bytes(src))
}
