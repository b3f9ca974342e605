//! `categorical`: a value drawn from a fixed set, stored as its index.
//!
//! Categories are values of a builtin type or strings. The descriptor keeps
//! them in a contiguous table with its own metadata, so assigning out of a
//! categorical is an ordinary assignment from the table entry.

use std::any::Any;
use std::fmt;
use std::mem::size_of;
use std::ptr;

use nd_ckernel::{
    make_kernreq_to_single_kernel_adapter, AssignErrorMode, BuiltinScalar, BuiltinType, ConversionError,
    ConversionErrorKind, KernelBuilder, KernelOp, KernelPrefix, KernelRecord, KernelRequest,
};
use rustc_hash::FxHashMap;

use super::string::{make_string, string_bytes, write_string};
use crate::assign::{compile_assignment, make_buffered_kernel};
use crate::{EvalContext, ExtendedType, Metadata, NdError, NdType, TypeId, TypeKind};

pub struct CategoricalType {
    category_tp: NdType,
    storage: BuiltinType,
    stride: usize,
    keys: Vec<Box<[u8]>>,
    lookup: FxHashMap<Box<[u8]>, u32>,
    category_md: Metadata,
    category_data: Box<[u64]>,
}

/// Categorical over `values`, each the raw bytes of one `category_tp` value
/// (UTF-8 text for strings).
pub fn make_categorical(category_tp: &NdType, values: &[&[u8]]) -> Result<NdType, NdError> {
    let string_keys = category_tp.type_id() == TypeId::String;
    if !category_tp.is_builtin() && !string_keys {
        return Err(NdError::construction(format!(
            "categories must be builtin values or strings, not {category_tp}"
        )));
    }
    if values.is_empty() {
        return Err(NdError::construction("categorical needs at least one category"));
    }
    let count = values.len();
    let storage = if count <= 1 << 8 {
        BuiltinType::UInt8
    } else if count <= 1 << 16 {
        BuiltinType::UInt16
    } else if u32::try_from(count).is_ok() {
        BuiltinType::UInt32
    } else {
        return Err(NdError::construction(format!("{count} categories do not fit 32-bit indices")));
    };

    let stride = category_tp.data_size();
    let category_md = Metadata::new(category_tp, &[])?;
    let mut category_data = vec![0u64; (count * stride).div_ceil(8)].into_boxed_slice();
    let base: *mut u8 = category_data.as_mut_ptr().cast();
    let mut keys = Vec::with_capacity(count);
    let mut lookup = FxHashMap::default();

    for (index, &value) in values.iter().enumerate() {
        let slot = base.wrapping_add(index * stride);
        if string_keys {
            if std::str::from_utf8(value).is_err() {
                return Err(NdError::construction(format!("category {index} is not valid UTF-8")));
            }
            // SAFETY: `slot` is a zeroed string element inside `category_data`,
            // and `category_md` is constructed string metadata.
            unsafe { write_string(category_md.as_ptr(), slot, value)? };
        } else {
            if value.len() != stride {
                return Err(NdError::construction(format!(
                    "category {index} has {} bytes, {category_tp} needs {stride}",
                    value.len()
                )));
            }
            // SAFETY: `slot` has `stride` bytes inside `category_data`.
            unsafe { ptr::copy_nonoverlapping(value.as_ptr(), slot, stride) };
        }
        let key: Box<[u8]> = value.into();
        let previous = lookup.insert(key.clone(), index as u32);
        if previous.is_some() {
            return Err(NdError::construction(format!("duplicate category at index {index}")));
        }
        keys.push(key);
    }

    tracing::debug!(%category_tp, count, %storage, "categorical type");
    Ok(NdType::new(CategoricalType {
        category_tp: category_tp.clone(),
        storage,
        stride,
        keys,
        lookup,
        category_md,
        category_data,
    }))
}

pub fn make_string_categorical(values: &[&str]) -> Result<NdType, NdError> {
    let keys: Vec<&[u8]> = values.iter().map(|v| v.as_bytes()).collect();
    make_categorical(&make_string(), &keys)
}

/// Categorical over builtin `values`.
pub fn make_categorical_of<T: BuiltinScalar>(values: &[T]) -> Result<NdType, NdError> {
    let size = T::TYPE.data_size();
    let mut bytes = vec![0u8; size * values.len()];
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(size)) {
        // SAFETY: `chunk` holds exactly `size` bytes.
        unsafe { value.store(chunk.as_mut_ptr()) };
    }
    let keys: Vec<&[u8]> = bytes.chunks_exact(size).collect();
    make_categorical(&NdType::Builtin(T::TYPE), &keys)
}

impl CategoricalType {
    pub fn category_count(&self) -> usize {
        self.keys.len()
    }

    pub fn category_type(&self) -> &NdType {
        &self.category_tp
    }

    /// Unsigned integer type the indices are stored as.
    pub fn storage_type(&self) -> BuiltinType {
        self.storage
    }

    pub fn index_of(&self, key: &[u8]) -> Option<u32> {
        self.lookup.get(key).copied()
    }

    pub fn category_bytes(&self, index: usize) -> Option<&[u8]> {
        self.keys.get(index).map(|k| &**k)
    }

    fn category_ptr(&self, index: usize) -> *const u8 {
        self.category_data
            .as_ptr()
            .cast::<u8>()
            .wrapping_add(index * self.stride)
    }

    fn string_keys(&self) -> bool {
        self.category_tp.type_id() == TypeId::String
    }
}

/// Read a stored category index.
///
/// # Safety
///
/// `src` must hold an index of width `storage`.
pub(crate) unsafe fn load_index(src: *const u8, storage: BuiltinType) -> usize {
    match storage {
        BuiltinType::UInt8 => usize::from(src.read()),
        BuiltinType::UInt16 => usize::from(src.cast::<u16>().read_unaligned()),
        _ => src.cast::<u32>().read_unaligned() as usize,
    }
}

unsafe fn store_index(dst: *mut u8, storage: BuiltinType, index: u32) {
    match storage {
        BuiltinType::UInt8 => dst.write(index as u8),
        BuiltinType::UInt16 => dst.cast::<u16>().write_unaligned(index as u16),
        _ => dst.cast::<u32>().write_unaligned(index),
    }
}

impl ExtendedType for CategoricalType {
    fn type_id(&self) -> TypeId {
        TypeId::Categorical
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Categorical
    }

    fn data_size(&self) -> usize {
        self.storage.data_size()
    }

    fn alignment(&self) -> usize {
        self.storage.alignment()
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.category_tp == self.category_tp && o.keys == self.keys)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_lossless_assignment(&self, dst: &NdType, src: &NdType) -> bool {
        src.downcast::<Self>()
            .is_some_and(|cat| dst == &cat.category_tp)
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
        if let Some(dst_cat) = dst_tp.downcast::<Self>() {
            if src_tp == &dst_cat.category_tp {
                let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
                return Ok(ckb.emplace(
                    at,
                    ToCategoricalKernel {
                        base: KernelPrefix::new(KernelOp::Single(to_categorical_single), Some(to_categorical_destruct)),
                        categorical: dst_cat,
                        _keepalive: dst_tp.clone(),
                    },
                )?);
            }
            // Anything else goes through the category type.
            let buffer_tp = dst_cat.category_tp.clone();
            return make_buffered_kernel(
                ckb,
                offset,
                &buffer_tp,
                request,
                |ckb, at, buf_md| compile_assignment(ckb, at, &buffer_tp, buf_md, src_tp, src_md, request, errmode, ectx),
                |ckb, at, buf_md| compile_assignment(ckb, at, dst_tp, dst_md, &buffer_tp, buf_md, request, errmode, ectx),
            );
        }

        let Some(src_cat) = src_tp.downcast::<Self>() else {
            return Err(NdError::incompatible(dst_tp, src_tp));
        };
        let at = make_kernreq_to_single_kernel_adapter(ckb, offset, request)?;
        let child = ckb.emplace(
            at,
            FromCategoricalKernel {
                base: KernelPrefix::new(KernelOp::Single(from_categorical_single), Some(from_categorical_destruct)),
                categorical: src_cat,
                _keepalive: src_tp.clone(),
            },
        )?;
        ckb.ensure_capacity_leaf(child)?;
        compile_assignment(
            ckb,
            child,
            dst_tp,
            dst_md,
            &src_cat.category_tp,
            src_cat.category_md.as_ptr(),
            KernelRequest::Single,
            errmode,
            ectx,
        )
    }
}

impl fmt::Debug for CategoricalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoricalType")
            .field("category_type", &self.category_tp)
            .field("categories", &self.keys.len())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CategoricalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.string_keys() {
            return write!(f, "categorical[{}, {} categories]", self.category_tp, self.keys.len());
        }
        write!(f, "categorical[{}, [", self.category_tp)?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}", String::from_utf8_lossy(key))?;
        }
        f.write_str("]]")
    }
}

#[repr(C)]
struct ToCategoricalKernel {
    base: KernelPrefix,
    categorical: *const CategoricalType,
    _keepalive: NdType,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for ToCategoricalKernel {}

unsafe fn to_categorical_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<ToCategoricalKernel>();
    let cat = &*e.categorical;
    let key = if cat.string_keys() {
        string_bytes(src)
    } else {
        std::slice::from_raw_parts(src, cat.stride)
    };
    match cat.index_of(key) {
        Some(index) => {
            store_index(dst, cat.storage, index);
            Ok(())
        }
        None => Err(not_a_category(cat, key)),
    }
}

#[cold]
fn not_a_category(cat: &CategoricalType, key: &[u8]) -> ConversionError {
    let shown = if cat.string_keys() {
        format!("{:?}", String::from_utf8_lossy(key))
    } else {
        format!("{key:02x?}")
    };
    ConversionError::new(
        ConversionErrorKind::OutOfDomain,
        format!("{shown} is not a category of {cat}"),
    )
}

unsafe fn to_categorical_destruct(ckp: *mut KernelPrefix) {
    ptr::drop_in_place(ckp.cast::<ToCategoricalKernel>());
}

#[repr(C)]
struct FromCategoricalKernel {
    base: KernelPrefix,
    categorical: *const CategoricalType,
    _keepalive: NdType,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for FromCategoricalKernel {}

const FROM_CHILD: usize = size_of::<FromCategoricalKernel>();

unsafe fn from_categorical_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let cat = &*(*ckp.cast::<FromCategoricalKernel>()).categorical;
    let index = load_index(src, cat.storage);
    if index >= cat.category_count() {
        return Err(ConversionError::new(
            ConversionErrorKind::OutOfDomain,
            format!("category index {index} is out of range for {cat}"),
        ));
    }
    KernelPrefix::call_single(KernelPrefix::child(ckp, FROM_CHILD), dst, cat.category_ptr(index))
}

unsafe fn from_categorical_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, FROM_CHILD);
    ptr::drop_in_place(ckp.cast::<FromCategoricalKernel>());
}

#[cfg(test)]
mod tests;
