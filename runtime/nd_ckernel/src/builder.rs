//! Growable arena holding a chain of kernel records.
//!
//! Records are placed at byte offsets. A parent stores its children's offsets
//! relative to itself, never their addresses, because [`KernelBuilder::ensure_capacity`]
//! may move the whole arena. References handed out by the builder borrow it
//! mutably, so none can survive a growth.
//!
//! Record 0 is the root. Dropping or resetting the builder runs the root's
//! destructor, which is responsible for destroying its children in turn.

use std::mem::{align_of, size_of};

use crate::prefix::{KernelOp, KernelPrefix, KernelRecord};
use crate::{ConversionError, KernelError};

/// Alignment of the arena base and the upper bound for record alignment.
pub const KERNEL_ALIGN: usize = 16;

/// Capacity of a fresh builder, in bytes.
pub const INITIAL_CAPACITY: usize = 256;

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Slot([u8; KERNEL_ALIGN]);

const EMPTY_SLOT: Slot = Slot([0; KERNEL_ALIGN]);

/// Round `offset` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_offset(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

pub struct KernelBuilder {
    slots: Vec<Slot>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Builder with at least room for a root prefix.
    pub fn with_capacity(bytes: usize) -> Self {
        let bytes = bytes.max(size_of::<KernelPrefix>());
        Self {
            slots: vec![EMPTY_SLOT; bytes.div_ceil(KERNEL_ALIGN)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() * KERNEL_ALIGN
    }

    /// Grow to at least `total` bytes. New space is zeroed; existing records
    /// keep their offsets but may move.
    pub fn ensure_capacity(&mut self, total: usize) -> Result<(), KernelError> {
        if total <= self.capacity() {
            return Ok(());
        }
        let needed = total.div_ceil(KERNEL_ALIGN);
        let target = needed.max(self.slots.len() * 2);
        self.slots
            .try_reserve_exact(target - self.slots.len())
            .map_err(|_| KernelError::OutOfMemory { requested: total })?;
        self.slots.resize(target, EMPTY_SLOT);
        tracing::trace!(capacity = self.capacity(), "kernel buffer grew");
        Ok(())
    }

    /// Make room for a bare prefix at `offset`.
    pub fn ensure_capacity_leaf(&mut self, offset: usize) -> Result<(), KernelError> {
        self.ensure_capacity(offset.saturating_add(size_of::<KernelPrefix>()))
    }

    #[inline]
    fn base(&mut self) -> *mut u8 {
        self.slots.as_mut_ptr().cast()
    }

    fn check_bounds<T>(&self, offset: usize) -> Result<(), KernelError> {
        let capacity = self.capacity();
        let fits = offset
            .checked_add(size_of::<T>())
            .is_some_and(|end| end <= capacity);
        if offset % align_of::<T>() == 0 && fits {
            Ok(())
        } else {
            Err(KernelError::InvalidOffset { offset, capacity })
        }
    }

    /// Root prefix. Capacity never drops below one prefix, so offset 0 is
    /// always in bounds.
    #[inline]
    fn root_ptr(&mut self) -> *mut KernelPrefix {
        self.base().cast()
    }

    /// Prefix of the record at `offset`.
    pub fn record_at(&mut self, offset: usize) -> Result<&mut KernelPrefix, KernelError> {
        self.check_bounds::<KernelPrefix>(offset)?;
        // SAFETY: in bounds and aligned; any byte pattern the arena holds at a
        // record start is zero or a prefix written through `emplace`.
        Ok(unsafe { &mut *self.base().add(offset).cast::<KernelPrefix>() })
    }

    /// Raw address of the record at `offset`, for handing to kernel calls.
    pub fn record_ptr(&mut self, offset: usize) -> Result<*mut KernelPrefix, KernelError> {
        self.check_bounds::<KernelPrefix>(offset)?;
        // SAFETY: bounds checked above.
        Ok(unsafe { self.base().add(offset).cast() })
    }

    /// Typed view of a record previously written with [`KernelBuilder::emplace`].
    ///
    /// # Safety
    ///
    /// A `T` must have been emplaced at `offset` and not destroyed since.
    pub unsafe fn get_at<T: KernelRecord>(&mut self, offset: usize) -> Result<&mut T, KernelError> {
        self.check_bounds::<T>(offset)?;
        Ok(&mut *self.base().add(offset).cast::<T>())
    }

    /// Placement-construct `record` at `offset`, growing as needed. Returns
    /// the offset just past the record.
    pub fn emplace<T: KernelRecord>(&mut self, offset: usize, record: T) -> Result<usize, KernelError> {
        let end = offset
            .checked_add(size_of::<T>())
            .ok_or(KernelError::InvalidOffset {
                offset,
                capacity: self.capacity(),
            })?;
        self.ensure_capacity(end)?;
        self.check_bounds::<T>(offset)?;
        // SAFETY: in bounds and aligned. The space holds zeroes or a prefix,
        // neither of which owns anything, so overwriting leaks nothing.
        unsafe { self.base().add(offset).cast::<T>().write(record) };
        Ok(end)
    }

    /// Install the function for one execution shape at `offset`.
    pub fn set_operation(&mut self, offset: usize, op: KernelOp) -> Result<usize, KernelError> {
        self.ensure_capacity_leaf(offset)?;
        self.record_at(offset)?.set_operation(op);
        Ok(offset + size_of::<KernelPrefix>())
    }

    /// Run the root kernel on one element.
    ///
    /// # Safety
    ///
    /// The chain must have been compiled for single execution, and `dst`/`src`
    /// must point at elements matching the compiled types and metadata.
    pub unsafe fn call_single(&mut self, dst: *mut u8, src: *const u8) -> Result<(), ConversionError> {
        KernelPrefix::call_single(self.root_ptr(), dst, src)
    }

    /// Run the root kernel over `count` elements.
    ///
    /// # Safety
    ///
    /// As [`KernelBuilder::call_single`], for every element the strides reach.
    pub unsafe fn call_strided(
        &mut self,
        dst: *mut u8,
        dst_stride: isize,
        src: *const u8,
        src_stride: isize,
        count: usize,
    ) -> Result<(), ConversionError> {
        KernelPrefix::call_strided(self.root_ptr(), dst, dst_stride, src, src_stride, count)
    }

    /// Destroy the chain rooted at offset 0 and zero the arena for reuse.
    pub fn reset(&mut self) {
        let root = self.root_ptr();
        // SAFETY: the root is either zeroed or a fully emplaced record whose
        // destructor handles every child it recorded.
        unsafe { KernelPrefix::destroy(root) };
        self.slots.fill(EMPTY_SLOT);
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KernelBuilder {
    fn drop(&mut self) {
        let root = self.root_ptr();
        // SAFETY: see `reset`.
        unsafe { KernelPrefix::destroy(root) };
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
