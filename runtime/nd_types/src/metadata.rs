//! Owned metadata regions and borrowed metadata pointers.

use std::fmt;
use std::marker::PhantomData;

use nd_memblock::{MemoryBlockRef, MetadataOwner};

use crate::{NdError, NdType};

/// Metadata for one type, constructed on creation and destructed on drop.
///
/// Used for scratch buffers and category tables that need metadata without an
/// array block around it.
pub struct Metadata {
    tp: NdType,
    words: Box<[u64]>,
}

// SAFETY: metadata holds block references (Send + Sync) and plain integers.
// Pointers into it are only dereferenced by kernels the owner runs.
unsafe impl Send for Metadata {}
// SAFETY: see `Send`.
unsafe impl Sync for Metadata {}

impl Metadata {
    fn zeroed(tp: &NdType) -> Self {
        Self {
            tp: tp.clone(),
            words: vec![0u64; tp.metadata_size().div_ceil(8)].into_boxed_slice(),
        }
    }

    /// Default-construct metadata for an array of `shape`.
    pub fn new(tp: &NdType, shape: &[usize]) -> Result<Self, NdError> {
        let mut metadata = Self::zeroed(tp);
        // SAFETY: fresh zeroed region of the type's metadata size. On error the
        // partially constructed region is destructed by `Drop`.
        unsafe { tp.metadata_default_construct(metadata.as_mut_ptr(), shape)? };
        Ok(metadata)
    }

    /// Copy-construct from metadata of the same type.
    ///
    /// # Safety
    ///
    /// `src` must point at constructed metadata for `tp`.
    pub unsafe fn copy_from(tp: &NdType, src: *const u8, embedded: Option<&MemoryBlockRef>) -> Self {
        let mut metadata = Self::zeroed(tp);
        tp.metadata_copy_construct(metadata.as_mut_ptr(), src, embedded);
        metadata
    }

    pub fn get_type(&self) -> &NdType {
        &self.tp
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }

    pub fn meta(&self) -> MetaRef<'_> {
        MetaRef::from(self)
    }

    /// Release temporary allocations (string bytes, var-dim elements).
    pub fn reset_buffers(&self) {
        // SAFETY: constructed in `new`/`copy_from`; callers reset only after
        // the data that referenced the buffers is dead.
        unsafe { self.tp.metadata_reset_buffers(self.as_ptr()) };
    }
}

impl Drop for Metadata {
    fn drop(&mut self) {
        let tp = self.tp.clone();
        // SAFETY: zeroed or constructed for `tp`.
        unsafe { tp.metadata_destruct(self.as_mut_ptr()) };
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("type", &self.tp)
            .field("bytes", &self.tp.metadata_size())
            .finish()
    }
}

/// Borrowed pointer to constructed metadata, valid for `'a`.
#[derive(Clone, Copy, Debug)]
pub struct MetaRef<'a> {
    ptr: *const u8,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> MetaRef<'a> {
    /// For types without metadata.
    pub const NONE: MetaRef<'static> = MetaRef {
        ptr: std::ptr::null(),
        _borrow: PhantomData,
    };

    /// # Safety
    ///
    /// `ptr` must point at constructed metadata that stays alive and
    /// unchanged for `'a`.
    pub unsafe fn from_raw(ptr: *const u8) -> Self {
        Self {
            ptr,
            _borrow: PhantomData,
        }
    }

    pub fn as_ptr(self) -> *const u8 {
        self.ptr
    }
}

impl<'a> From<&'a Metadata> for MetaRef<'a> {
    fn from(metadata: &'a Metadata) -> Self {
        MetaRef {
            ptr: metadata.as_ptr(),
            _borrow: PhantomData,
        }
    }
}

/// Destructs an array block's metadata with the type it was built for.
pub(crate) struct TypeOwner(pub(crate) NdType);

impl MetadataOwner for TypeOwner {
    unsafe fn destruct_metadata(&self, metadata: *mut u8) {
        self.0.metadata_destruct(metadata);
    }
}
