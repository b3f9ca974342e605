//! `groupby[data, by]`: the elements of `data` partitioned by the
//! categorical keys in `by`.
//!
//! The operand is a struct of two pointers, one to each input array; the
//! value is `ncategories * var * element`. Evaluating copies every data
//! element into the group of its key, keeping input order within a group.
//! Assigning groups back scatters each element to the position its key
//! selects, so an equal groupby copies data between the two inputs.
//!
//! Keys may themselves be expressions whose value is categorical; each one
//! is evaluated once per kernel call.

use std::any::Any;
use std::fmt;
use std::mem::size_of;
use std::ptr;

use nd_ckernel::{
    align_offset, make_kernreq_to_single_kernel_adapter, AssignErrorMode, BuiltinType, ConversionError,
    ConversionErrorKind, KernelBuilder, KernelOp, KernelPrefix, KernelRecord, KernelRequest, KERNEL_ALIGN,
};
use nd_memblock::MemoryBlockRef;

use super::categorical::load_index;
use super::pointer::write_address;
use super::{
    dim_view, make_fixed_dim, make_pointer, make_struct, make_var_dim, CategoricalType, FixedDimType, PointerMeta,
    StridedDimType, StructType, VarDimData, VarDimMeta,
};
use crate::assign::compile_assignment;
use crate::{EvalContext, ExtendedType, NdArray, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[derive(Debug)]
pub struct GroupByType {
    data_values: NdType,
    by_values: NdType,
    value: NdType,
    operand: NdType,
}

fn static_dim_element(tp: &NdType) -> Option<&NdType> {
    if let Some(strided) = tp.downcast::<StridedDimType>() {
        return Some(strided.element_type());
    }
    tp.downcast::<FixedDimType>().map(FixedDimType::element_type)
}

pub fn make_groupby(data_values: &NdType, by_values: &NdType) -> Result<NdType, NdError> {
    let Some(data_element) = static_dim_element(data_values) else {
        return Err(NdError::construction(format!(
            "groupby data must be a strided or fixed dimension, not {data_values}"
        )));
    };
    let Some(by_element) = static_dim_element(by_values) else {
        return Err(NdError::construction(format!(
            "groupby keys must be a strided or fixed dimension, not {by_values}"
        )));
    };
    let Some(groups) = by_element.value_type().downcast::<CategoricalType>() else {
        return Err(NdError::construction(format!(
            "groupby keys must be categorical, not {by_element}"
        )));
    };

    let value = make_fixed_dim(groups.category_count(), &make_var_dim(data_element)?)?;
    let operand = make_struct(&[("data", make_pointer(data_values)), ("by", make_pointer(by_values))])?;
    Ok(NdType::new(GroupByType {
        data_values: data_values.clone(),
        by_values: by_values.clone(),
        value,
        operand,
    }))
}

/// Lazily grouped view over `data` keyed by `by`. Both arrays stay alive as
/// long as the result does.
pub fn groupby(data: &NdArray, by: &NdArray) -> Result<NdArray, NdError> {
    let tp = make_groupby(data.get_type(), by.get_type())?;
    let Some(operand) = tp.operand_type().downcast::<StructType>() else {
        return Err(NdError::construction("groupby operand is not a struct"));
    };
    let sources = [data, by];
    let array = NdArray::with_metadata(&tp, tp.data_size(), |md| {
        for (field, source) in sources.iter().enumerate() {
            // SAFETY: `md` is the zeroed metadata region for `tp`, laid out as
            // the operand struct: per field, pointer metadata then the
            // source's own metadata.
            unsafe {
                let field_md = md.add(operand.metadata_offset(field));
                field_md.cast::<PointerMeta>().write(PointerMeta {
                    blockref: Some(source.memory_block().clone()),
                    offset: 0,
                });
                source.get_type().metadata_copy_construct(
                    field_md.add(size_of::<PointerMeta>()),
                    source.metadata_ptr(),
                    Some(source.memory_block()),
                );
            }
        }
        Ok(())
    })?;
    for (field, source) in sources.iter().enumerate() {
        // SAFETY: the array's data is one operand struct.
        unsafe { write_address(array.data_ptr().add(operand.data_offset(field)), source.data_ptr()) };
    }
    Ok(array)
}

impl GroupByType {
    pub fn groups_type(&self) -> &NdType {
        static_dim_element(&self.by_values).unwrap_or(&self.by_values)
    }

    fn groups(&self) -> Option<&CategoricalType> {
        self.groups_type().value_type().downcast::<CategoricalType>()
    }
}

impl ExtendedType for GroupByType {
    fn type_id(&self) -> TypeId {
        TypeId::GroupBy
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Expression
    }

    fn data_size(&self) -> usize {
        self.operand.data_size()
    }

    fn alignment(&self) -> usize {
        self.operand.alignment()
    }

    fn metadata_size(&self) -> usize {
        self.operand.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        self.operand.flags() | TypeFlags::EXPRESSION
    }

    fn ndim(&self) -> usize {
        self.value.ndim()
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.data_values == self.data_values && o.by_values == self.by_values)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> Option<&NdType> {
        Some(&self.value)
    }

    fn operand_type(&self) -> Option<&NdType> {
        Some(&self.operand)
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        self.operand.metadata_default_construct(metadata, shape)
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        self.operand.metadata_copy_construct(dst, src, embedded);
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        self.operand.metadata_reset_buffers(metadata);
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        self.operand.metadata_destruct(metadata);
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
        // The value is `N * var * T`; the fixed dimension shares the var
        // dimension's metadata.
        // SAFETY: compile callers pass metadata constructed for the value type.
        let var_meta = unsafe { &*dst_md.cast::<VarDimMeta>() };
        if var_meta.offset != 0 {
            return Err(NdError::layout(format!(
                "groupby destination has a nonzero element offset {}",
                var_meta.offset
            )));
        }
        if var_meta.blockref.is_none() {
            return Err(NdError::layout("groupby destination has no memory block"));
        }
        self.make_group_kernel(ckb, offset, dst_md, src_md, request, Direction::Gather, ectx)
    }

    /// Writes every group element back to the data position its key selects.
    /// Group sizes must match the key counts.
    fn make_value_to_operand_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_md: *const u8,
        src_md: *const u8,
        request: KernelRequest,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        self.make_group_kernel(ckb, offset, src_md, dst_md, request, Direction::Scatter, ectx)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    /// Operand to value: group the data.
    Gather,
    /// Value to operand: write groups back into the data.
    Scatter,
}

impl GroupByType {
    #[expect(clippy::too_many_arguments, reason = "mirrors the expression kernel factories")]
    fn make_group_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        value_md: *const u8,
        operand_md: *const u8,
        request: KernelRequest,
        direction: Direction,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        let (Some(operand), Some(groups)) = (self.operand.downcast::<StructType>(), self.groups()) else {
            return Err(NdError::construction(format!("malformed {self}")));
        };
        let Some(data_element) = static_dim_element(&self.data_values) else {
            return Err(NdError::construction(format!("malformed {self}")));
        };

        // SAFETY: operand metadata holds, per field, pointer metadata
        // followed by the pointed-to array's metadata.
        let (data_md, by_md) = unsafe {
            (
                operand_md.add(operand.metadata_offset(0)),
                operand_md.add(operand.metadata_offset(1)),
            )
        };
        // SAFETY: as above.
        let data_dim = unsafe { dim_view(&self.data_values, data_md.add(size_of::<PointerMeta>())) };
        let by_dim = unsafe { dim_view(&self.by_values, by_md.add(size_of::<PointerMeta>())) };
        let (Some(data_dim), Some(by_dim)) = (data_dim, by_dim) else {
            return Err(NdError::construction(format!("malformed {self}")));
        };
        if data_dim.size != by_dim.size {
            return Err(NdError::broadcast(&self.data_values, &self.by_values));
        }

        tracing::debug!(groups = groups.category_count(), size = data_dim.size, "groupby kernel");
        let op = match direction {
            Direction::Gather => KernelOp::Single(gather_single),
            Direction::Scatter => KernelOp::Single(scatter_single),
        };
        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let child = ckb.emplace(
            at,
            GroupByKernel {
                base: KernelPrefix::new(op, Some(groupby_destruct)),
                data_field: operand.data_offset(0),
                by_field: operand.data_offset(1),
                data_ptr_meta: data_md.cast(),
                by_ptr_meta: by_md.cast(),
                size: data_dim.size,
                data_stride: data_dim.stride,
                by_stride: by_dim.stride,
                storage: groups.storage_type(),
                group_count: groups.category_count(),
                var_meta: value_md.cast(),
                element_align: data_element.alignment(),
                key_offset: 0,
            },
        )?;
        ckb.ensure_capacity_leaf(child)?;
        // SAFETY: var metadata is followed by the element's.
        let group_element_md = unsafe { value_md.add(size_of::<VarDimMeta>()) };
        let end = match direction {
            Direction::Gather => compile_assignment(
                ckb,
                child,
                data_element,
                group_element_md,
                data_dim.element_tp,
                data_dim.element_md,
                KernelRequest::Single,
                AssignErrorMode::None,
                ectx,
            )?,
            Direction::Scatter => compile_assignment(
                ckb,
                child,
                data_dim.element_tp,
                data_dim.element_md,
                data_element,
                group_element_md,
                KernelRequest::Single,
                AssignErrorMode::None,
                ectx,
            )?,
        };
        if !by_dim.element_tp.is_expression() {
            return Ok(end);
        }

        let key_at = align_offset(end, KERNEL_ALIGN);
        ckb.ensure_capacity_leaf(key_at)?;
        // SAFETY: emplaced above; children never overwrite their parent.
        unsafe { ckb.get_at::<GroupByKernel>(at) }?.key_offset = key_at - at;
        compile_assignment(
            ckb,
            key_at,
            self.groups_type().value_type(),
            // Categorical values carry no metadata.
            ptr::null(),
            by_dim.element_tp,
            by_dim.element_md,
            KernelRequest::Single,
            AssignErrorMode::Default,
            ectx,
        )
    }
}

impl fmt::Display for GroupByType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "groupby[{}, by={}]", self.data_values, self.by_values)
    }
}

/// Shared by both directions. `var_meta` describes the value side.
#[repr(C)]
struct GroupByKernel {
    base: KernelPrefix,
    data_field: usize,
    by_field: usize,
    data_ptr_meta: *const PointerMeta,
    by_ptr_meta: *const PointerMeta,
    size: usize,
    data_stride: isize,
    by_stride: isize,
    storage: BuiltinType,
    group_count: usize,
    var_meta: *const VarDimMeta,
    element_align: usize,
    /// Child evaluating one key expression into its categorical index, or 0
    /// when keys are stored indices.
    key_offset: usize,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for GroupByKernel {}

const ELEMENT_CHILD: usize = size_of::<GroupByKernel>();

unsafe fn read_field(operand: *const u8, field: usize, meta: *const PointerMeta) -> *const u8 {
    operand
        .add(field)
        .cast::<*const u8>()
        .read_unaligned()
        .wrapping_offset((*meta).offset)
}

/// Group index of every element, and the number of elements per group.
unsafe fn read_keys(
    e: &GroupByKernel,
    ckp: *mut KernelPrefix,
    by: *const u8,
) -> Result<(Vec<usize>, Vec<usize>), ConversionError> {
    let key_child = (e.key_offset != 0).then(|| KernelPrefix::child(ckp, e.key_offset));
    let mut keys = Vec::with_capacity(e.size);
    let mut counts = vec![0usize; e.group_count];
    for i in 0..e.size {
        let element = by.wrapping_offset(i as isize * e.by_stride);
        let key = match key_child {
            Some(child) => {
                let mut index = 0u32;
                KernelPrefix::call_single(child, ptr::from_mut(&mut index).cast(), element)?;
                load_index(ptr::from_ref(&index).cast(), e.storage)
            }
            None => load_index(element, e.storage),
        };
        let Some(count) = counts.get_mut(key) else {
            return Err(ConversionError::new(
                ConversionErrorKind::OutOfDomain,
                format!("groupby key {key} at position {i} is out of range for {} groups", e.group_count),
            ));
        };
        *count += 1;
        keys.push(key);
    }
    Ok((keys, counts))
}

unsafe fn gather_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<GroupByKernel>();
    let data = read_field(src, e.data_field, e.data_ptr_meta);
    let by = read_field(src, e.by_field, e.by_ptr_meta);
    let (keys, counts) = read_keys(e, ckp, by)?;

    let meta = &*e.var_meta;
    let Some(block) = &meta.blockref else {
        return Err(ConversionError::new(
            ConversionErrorKind::AllocationFailed,
            "groupby destination has no memory block",
        ));
    };
    let element_stride = meta.stride.unsigned_abs();
    let storage = block
        .pod_allocate(e.size * element_stride, e.element_align)
        .map_err(|err| ConversionError::new(ConversionErrorKind::AllocationFailed, err.to_string()))?
        .as_ptr();

    let mut cursors = Vec::with_capacity(e.group_count);
    let mut next = storage;
    for (group, &count) in counts.iter().enumerate() {
        dst.add(group * size_of::<VarDimData>())
            .cast::<VarDimData>()
            .write(VarDimData { begin: next, size: count });
        cursors.push(next);
        next = next.add(count * element_stride);
    }

    let child = KernelPrefix::child(ckp, ELEMENT_CHILD);
    for (i, &key) in keys.iter().enumerate() {
        let cursor = &mut cursors[key];
        KernelPrefix::call_single(child, *cursor, data.wrapping_offset(i as isize * e.data_stride))?;
        *cursor = cursor.add(element_stride);
    }
    Ok(())
}

unsafe fn scatter_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<GroupByKernel>();
    let data = read_field(dst, e.data_field, e.data_ptr_meta).cast_mut();
    let by = read_field(dst, e.by_field, e.by_ptr_meta);
    let (keys, counts) = read_keys(e, ckp, by)?;

    let meta = &*e.var_meta;
    let mut cursors = Vec::with_capacity(e.group_count);
    for (group, &count) in counts.iter().enumerate() {
        let group_data = src.add(group * size_of::<VarDimData>()).cast::<VarDimData>().read();
        if group_data.size != count {
            return Err(ConversionError::new(
                ConversionErrorKind::DimensionMismatch,
                format!(
                    "group {group} holds {} elements but its key occurs {count} times",
                    group_data.size
                ),
            ));
        }
        cursors.push(group_data.begin.cast_const().wrapping_offset(meta.offset));
    }

    let child = KernelPrefix::child(ckp, ELEMENT_CHILD);
    for (i, &key) in keys.iter().enumerate() {
        let cursor = &mut cursors[key];
        KernelPrefix::call_single(child, data.wrapping_offset(i as isize * e.data_stride), *cursor)?;
        *cursor = cursor.wrapping_offset(meta.stride);
    }
    Ok(())
}

unsafe fn groupby_destruct(ckp: *mut KernelPrefix) {
    let key_offset = (*ckp.cast::<GroupByKernel>()).key_offset;
    KernelPrefix::destroy_child(ckp, ELEMENT_CHILD);
    KernelPrefix::destroy_child(ckp, key_offset);
}

#[cfg(test)]
mod tests;
