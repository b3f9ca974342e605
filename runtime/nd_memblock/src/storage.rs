use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::AllocError;

/// Zero-initialized, uniquely owned heap range.
///
/// Zero-length requests still allocate one byte so the pointer is always
/// real and correctly aligned.
pub(crate) struct RawStorage {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// SAFETY: the allocation is exclusively owned and carries no thread affinity.
unsafe impl Send for RawStorage {}
// SAFETY: `&RawStorage` only exposes the address, never a reference to the bytes.
unsafe impl Sync for RawStorage {}

impl RawStorage {
    pub(crate) fn zeroed(len: usize, align: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(len.max(1), align.max(1))
            .map_err(|_| AllocError::InvalidLayout { size: len, align })?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size: len, align })?;
        Ok(Self { ptr, len, layout })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for RawStorage {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc_zeroed` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
