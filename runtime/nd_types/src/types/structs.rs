//! `{name: T, ...}`: fields at fixed offsets, C layout.

use std::any::Any;
use std::fmt;
use std::ptr;

use nd_ckernel::{
    align_offset, make_kernreq_to_single_kernel_adapter, AssignErrorMode, ConversionError, KernelBuilder, KernelOp,
    KernelPrefix, KernelRecord, KernelRequest, KERNEL_ALIGN,
};
use nd_memblock::MemoryBlockRef;
use smallvec::SmallVec;

use crate::assign::{compile_assignment, is_lossless_assignment};
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[derive(Debug)]
pub struct StructType {
    names: Vec<String>,
    types: Vec<NdType>,
    data_offsets: Vec<usize>,
    metadata_offsets: Vec<usize>,
    data_size: usize,
    alignment: usize,
    metadata_size: usize,
    flags: TypeFlags,
}

pub fn make_struct(fields: &[(&str, NdType)]) -> Result<NdType, NdError> {
    let mut names = Vec::with_capacity(fields.len());
    let mut types = Vec::with_capacity(fields.len());
    let mut data_offsets = Vec::with_capacity(fields.len());
    let mut metadata_offsets = Vec::with_capacity(fields.len());
    let mut data_end = 0;
    let mut metadata_end = 0;
    let mut alignment = 1;

    for (name, tp) in fields {
        if names.iter().any(|n: &String| n == name) {
            return Err(NdError::construction(format!("duplicate struct field {name:?}")));
        }
        if tp.data_size() == 0 {
            return Err(NdError::construction(format!(
                "struct field {name:?} of type {tp} has no fixed size"
            )));
        }
        let field_align = tp.alignment();
        let offset = align_offset(data_end, field_align);
        data_end = offset + tp.data_size();
        alignment = alignment.max(field_align);

        let md_offset = align_offset(metadata_end, 8);
        metadata_end = md_offset + tp.metadata_size();

        names.push((*name).to_owned());
        types.push(tp.clone());
        data_offsets.push(offset);
        metadata_offsets.push(md_offset);
    }

    let flags = TypeFlags::propagate_all(types.iter().map(NdType::flags));
    Ok(NdType::new(StructType {
        names,
        types,
        data_offsets,
        metadata_offsets,
        data_size: align_offset(data_end, alignment),
        alignment,
        metadata_size: align_offset(metadata_end, 8),
        flags,
    }))
}

impl StructType {
    pub fn field_count(&self) -> usize {
        self.names.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn field_name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn field_type(&self, index: usize) -> &NdType {
        &self.types[index]
    }

    pub fn data_offset(&self, index: usize) -> usize {
        self.data_offsets[index]
    }

    pub fn metadata_offset(&self, index: usize) -> usize {
        self.metadata_offsets[index]
    }

    fn fields(&self) -> impl Iterator<Item = (&NdType, usize)> {
        self.types.iter().zip(self.metadata_offsets.iter().copied())
    }
}

impl ExtendedType for StructType {
    fn type_id(&self) -> TypeId {
        TypeId::Struct
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Struct
    }

    fn data_size(&self) -> usize {
        self.data_size
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn metadata_size(&self) -> usize {
        self.metadata_size
    }

    fn flags(&self) -> TypeFlags {
        self.flags
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.names == self.names && o.types == self.types)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_lossless_assignment(&self, dst: &NdType, src: &NdType) -> bool {
        let (Some(d), Some(s)) = (dst.downcast::<Self>(), src.downcast::<Self>()) else {
            return false;
        };
        d.names.iter().enumerate().all(|(i, name)| {
            s.field_index(name)
                .is_some_and(|j| is_lossless_assignment(&d.types[i], &s.types[j]))
        }) && d.field_count() == s.field_count()
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        for (tp, md_offset) in self.fields() {
            tp.metadata_default_construct(metadata.add(md_offset), shape)?;
        }
        Ok(())
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        for (tp, md_offset) in self.fields() {
            tp.metadata_copy_construct(dst.add(md_offset), src.add(md_offset), embedded);
        }
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        for (tp, md_offset) in self.fields() {
            tp.metadata_reset_buffers(metadata.add(md_offset));
        }
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        for (tp, md_offset) in self.fields() {
            tp.metadata_destruct(metadata.add(md_offset));
        }
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
        let (Some(dst), Some(src)) = (dst_tp.downcast::<Self>(), src_tp.downcast::<Self>()) else {
            return Err(NdError::incompatible(dst_tp, src_tp));
        };
        if dst.field_count() != src.field_count() {
            return Err(NdError::incompatible(dst_tp, src_tp));
        }
        // Fields match by name.
        let mut pairs = SmallVec::<[(usize, usize); 4]>::new();
        for (i, name) in dst.names.iter().enumerate() {
            let Some(j) = src.field_index(name) else {
                return Err(NdError::incompatible(dst_tp, src_tp));
            };
            pairs.push((i, j));
        }

        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let mut end = ckb.emplace(
            at,
            StructKernel {
                base: KernelPrefix::new(KernelOp::Single(struct_single), Some(struct_destruct)),
                fields: SmallVec::new(),
            },
        )?;
        for (i, j) in pairs {
            let child = align_offset(end, KERNEL_ALIGN);
            ckb.ensure_capacity_leaf(child)?;
            // SAFETY: emplaced above; children never overwrite their parent.
            unsafe { ckb.get_at::<StructKernel>(at) }?.fields.push(FieldCopy {
                dst_offset: dst.data_offsets[i],
                src_offset: src.data_offsets[j],
                child_offset: child - at,
            });
            end = compile_assignment(
                ckb,
                child,
                &dst.types[i],
                // SAFETY: field metadata lies inside the struct's.
                unsafe { dst_md.add(dst.metadata_offsets[i]) },
                &src.types[j],
                unsafe { src_md.add(src.metadata_offsets[j]) },
                KernelRequest::Single,
                errmode,
                ectx,
            )?;
        }
        Ok(end)
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, tp)) in self.names.iter().zip(&self.types).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {tp}")?;
        }
        f.write_str("}")
    }
}

#[derive(Clone, Copy)]
struct FieldCopy {
    dst_offset: usize,
    src_offset: usize,
    child_offset: usize,
}

#[repr(C)]
struct StructKernel {
    base: KernelPrefix,
    fields: SmallVec<[FieldCopy; 4]>,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for StructKernel {}

unsafe fn struct_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<StructKernel>();
    for field in &e.fields {
        KernelPrefix::call_single(
            KernelPrefix::child(ckp, field.child_offset),
            dst.add(field.dst_offset),
            src.add(field.src_offset),
        )?;
    }
    Ok(())
}

unsafe fn struct_destruct(ckp: *mut KernelPrefix) {
    let e = &*ckp.cast::<StructKernel>();
    for field in &e.fields {
        KernelPrefix::destroy_child(ckp, field.child_offset);
    }
    ptr::drop_in_place(ckp.cast::<StructKernel>());
}
