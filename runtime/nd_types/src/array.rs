//! Arrays: a type plus an array memory block holding metadata and data.

use std::fmt;
use std::mem::size_of;
use std::ptr::NonNull;

use nd_ckernel::{AssignErrorMode, BuiltinScalar, KernelRequest};
use nd_memblock::{ArrayBinding, MemoryBlockRef};

use crate::assign::AssignmentKernel;
use crate::metadata::TypeOwner;
use crate::types::{
    dim_view, make_string, make_strided_dim, string_bytes, write_string, StridedDimMeta, StringData,
};
use crate::{EvalContext, MetaRef, NdError, NdType, TypeId};

/// A view of typed data. Cloning shares the block.
#[derive(Clone)]
pub struct NdArray {
    tp: NdType,
    block: MemoryBlockRef,
    metadata: NonNull<u8>,
    data: NonNull<u8>,
}

// SAFETY: both pointers address memory owned by `block`, which is Send + Sync.
// Element writes are the caller's to synchronize.
unsafe impl Send for NdArray {}
// SAFETY: see `Send`.
unsafe impl Sync for NdArray {}

impl NdArray {
    /// Zero-filled array of `tp` with default metadata for `shape`.
    pub fn empty(tp: &NdType, shape: &[usize]) -> Result<Self, NdError> {
        let data_size = tp
            .default_data_size(shape)
            .ok_or_else(|| NdError::layout(format!("{tp} with shape {shape:?} is too large")))?;
        Self::with_metadata(tp, data_size, |md| {
            // SAFETY: `md` is the fresh zeroed metadata region.
            unsafe { tp.metadata_default_construct(md, shape) }
        })
    }

    /// Allocate an array block and build its metadata with `construct`.
    pub(crate) fn with_metadata(
        tp: &NdType,
        data_size: usize,
        construct: impl FnOnce(*mut u8) -> Result<(), NdError>,
    ) -> Result<Self, NdError> {
        let block = MemoryBlockRef::allocate_array(tp.metadata_size(), data_size, tp.alignment())?;
        let metadata = block.array_metadata()?;
        let data = block.array_inline_data()?;
        if let Err(err) = construct(metadata.as_ptr()) {
            // SAFETY: zeroed or partially constructed for `tp`.
            unsafe { tp.metadata_destruct(metadata.as_ptr()) };
            return Err(err);
        }
        block.bind_array(ArrayBinding {
            owner: Box::new(TypeOwner(tp.clone())),
            data_pointer: data,
            data_reference: None,
        })?;
        Ok(Self {
            tp: tp.clone(),
            block,
            metadata,
            data,
        })
    }

    /// One-dimensional strided array of builtin values.
    pub fn from_slice<T: BuiltinScalar>(values: &[T]) -> Result<Self, NdError> {
        let array = Self::empty(&make_strided_dim(&NdType::of::<T>()), &[values.len()])?;
        let size = T::TYPE.data_size();
        for (i, value) in values.iter().enumerate() {
            // SAFETY: the array holds `values.len()` contiguous elements.
            unsafe { value.store(array.data_ptr().add(i * size)) };
        }
        Ok(array)
    }

    /// One-dimensional strided array of strings.
    pub fn from_strs(values: &[&str]) -> Result<Self, NdError> {
        let array = Self::empty(&make_strided_dim(&make_string()), &[values.len()])?;
        let element_md = array.metadata_ptr().wrapping_add(size_of::<StridedDimMeta>());
        for (i, value) in values.iter().enumerate() {
            // SAFETY: contiguous string elements after the dimension header.
            let element = unsafe { array.data_ptr().add(i * size_of::<StringData>()) };
            // SAFETY: as above.
            unsafe { write_string(element_md, element, value.as_bytes())? };
        }
        Ok(array)
    }

    /// Zero-dimensional array holding `value`.
    pub fn scalar<T: BuiltinScalar>(value: T) -> Result<Self, NdError> {
        let array = Self::empty(&NdType::of::<T>(), &[])?;
        // SAFETY: the data region holds one `T`.
        unsafe { value.store(array.data_ptr()) };
        Ok(array)
    }

    pub fn get_type(&self) -> &NdType {
        &self.tp
    }

    pub fn memory_block(&self) -> &MemoryBlockRef {
        &self.block
    }

    pub fn metadata_ptr(&self) -> *mut u8 {
        self.metadata.as_ptr()
    }

    pub fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    pub fn meta(&self) -> MetaRef<'_> {
        // SAFETY: constructed when the array was created and alive with `self`.
        unsafe { MetaRef::from_raw(self.metadata.as_ptr()) }
    }

    /// Assign `src` into this array's data.
    pub fn assign_from(&mut self, src: &NdArray, errmode: AssignErrorMode, ectx: &EvalContext) -> Result<(), NdError> {
        let mut kernel = AssignmentKernel::new(
            &self.tp,
            self.meta(),
            &src.tp,
            src.meta(),
            KernelRequest::Single,
            errmode,
            ectx,
        )?;
        // SAFETY: both data regions match the types and metadata compiled.
        unsafe { kernel.single(self.data_ptr(), src.data_ptr()) }?;
        Ok(())
    }

    /// Elements of a one-dimensional array of `T`.
    pub fn to_vec<T: BuiltinScalar>(&self) -> Result<Vec<T>, NdError> {
        let element = NdType::of::<T>();
        // SAFETY: metadata was constructed for `self.tp`.
        let view = unsafe { dim_view(&self.tp, self.metadata_ptr()) }
            .filter(|view| *view.element_tp == element)
            .ok_or_else(|| NdError::incompatible(&make_strided_dim(&element), &self.tp))?;
        Ok((0..view.size)
            // SAFETY: `i < size` elements at `stride`.
            .map(|i| unsafe { T::load(self.data_ptr().wrapping_offset(i as isize * view.stride)) })
            .collect())
    }

    /// Elements of a one-dimensional array of strings.
    pub fn to_strings(&self) -> Result<Vec<String>, NdError> {
        // SAFETY: metadata was constructed for `self.tp`.
        let view = unsafe { dim_view(&self.tp, self.metadata_ptr()) }
            .filter(|view| view.element_tp.type_id() == TypeId::String)
            .ok_or_else(|| NdError::incompatible(&make_strided_dim(&make_string()), &self.tp))?;
        Ok((0..view.size)
            .map(|i| {
                // SAFETY: string elements whose bytes the metadata keeps alive.
                let bytes = unsafe { string_bytes(self.data_ptr().wrapping_offset(i as isize * view.stride)) };
                String::from_utf8_lossy(bytes).into_owned()
            })
            .collect())
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("type", &self.tp)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}
