//! Array blocks: a metadata region followed by an aligned data region.

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::storage::RawStorage;
use crate::{AllocError, MemoryBlockRef};

/// Destroys the metadata an array block carries.
///
/// Implemented by the type layer; the block only knows the region's address.
pub trait MetadataOwner: Send + Sync {
    /// # Safety
    ///
    /// `metadata` must point at metadata previously constructed for this owner.
    unsafe fn destruct_metadata(&self, metadata: *mut u8);
}

/// State an array block acquires exactly once when its metadata is ready.
pub struct ArrayBinding {
    pub owner: Box<dyn MetadataOwner>,
    pub data_pointer: NonNull<u8>,
    /// Block owning the data when it does not live inline in this block.
    pub data_reference: Option<MemoryBlockRef>,
}

// SAFETY: `data_pointer` is an address inside memory kept alive by the block
// itself or by `data_reference`; element access is the caller's to synchronize.
unsafe impl Send for ArrayBinding {}
// SAFETY: see `Send`.
unsafe impl Sync for ArrayBinding {}

pub(crate) struct ArrayStorage {
    storage: RawStorage,
    data_offset: usize,
    binding: OnceLock<ArrayBinding>,
}

impl ArrayStorage {
    pub(crate) fn new(
        metadata_size: usize,
        data_size: usize,
        data_alignment: usize,
    ) -> Result<Self, AllocError> {
        let data_alignment = data_alignment.max(1);
        if !data_alignment.is_power_of_two() {
            return Err(AllocError::InvalidLayout {
                size: data_size,
                align: data_alignment,
            });
        }
        let align = data_alignment.max(std::mem::align_of::<usize>());
        let data_offset = metadata_size.next_multiple_of(data_alignment);
        let total = data_offset
            .checked_add(data_size)
            .ok_or(AllocError::InvalidLayout { size: data_size, align })?;
        Ok(Self {
            storage: RawStorage::zeroed(total, align)?,
            data_offset,
            binding: OnceLock::new(),
        })
    }

    pub(crate) fn metadata(&self) -> NonNull<u8> {
        self.storage.non_null()
    }

    pub(crate) fn inline_data(&self) -> NonNull<u8> {
        // SAFETY: `data_offset <= storage.len()` by construction.
        unsafe { self.storage.non_null().add(self.data_offset) }
    }

    pub(crate) fn binding(&self) -> Option<&ArrayBinding> {
        self.binding.get()
    }

    pub(crate) fn bind(&self, binding: ArrayBinding) -> Result<(), AllocError> {
        self.binding.set(binding).map_err(|_| AllocError::AlreadyBound)
    }
}

impl Drop for ArrayStorage {
    fn drop(&mut self) {
        // An unbound block never had its metadata constructed.
        if let Some(binding) = self.binding.get() {
            // SAFETY: binding happens only after the metadata was constructed
            // for `owner`, and nothing else can observe the block now.
            unsafe { binding.owner.destruct_metadata(self.storage.as_ptr()) };
        }
    }
}
