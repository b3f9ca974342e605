//! Reference-counted memory blocks.
//!
//! A [`MemoryBlockRef`] is a shared handle to one heap allocation holding an
//! atomic reference count next to a kind-specific payload:
//!
//! - [`MemoryBlockKind::Fixed`]: raw zeroed storage of a fixed size.
//! - [`MemoryBlockKind::Pod`]: a chunked bump allocator for variable-length
//!   payloads (string bytes, var-dim elements).
//! - [`MemoryBlockKind::Executable`]: storage for generated code, with hooks
//!   that deregister it from the runtime before it is freed.
//! - [`MemoryBlockKind::Array`]: array metadata followed by array data. The
//!   block starts uninitialized and is bound to its metadata owner once.
//!
//! # Design
//!
//! The count lives in the same allocation as the payload. Cloning a handle
//! retains, dropping it releases. The release that observes the count hitting
//! zero runs the kind's finalizer and frees the allocation; an acquire fence
//! orders it after every other holder's last use, so concurrent releases from
//! many threads finalize exactly once.
//!
//! Payload bytes are not synchronized by the block. Threads sharing a mutable
//! view must coordinate element writes themselves.

#![allow(unsafe_code, reason = "memory blocks manage raw allocations and an intrusive count")]
#![warn(clippy::allow_attributes_without_reason)]

mod array;
mod error;
mod executable;
mod pod;
mod storage;

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicUsize, Ordering};

use parking_lot::Mutex;

pub use array::{ArrayBinding, MetadataOwner};
pub use error::AllocError;

use array::ArrayStorage;
use executable::ExecutableStorage;
use pod::PodArena;
use storage::RawStorage;

/// Upper bound on live handles before we treat the count as corrupted.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// What a memory block stores and how it is finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryBlockKind {
    Fixed,
    Pod,
    Executable,
    Array,
}

impl MemoryBlockKind {
    pub const fn name(self) -> &'static str {
        match self {
            MemoryBlockKind::Fixed => "fixed",
            MemoryBlockKind::Pod => "pod",
            MemoryBlockKind::Executable => "executable",
            MemoryBlockKind::Array => "array",
        }
    }
}

impl fmt::Display for MemoryBlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum Payload {
    Fixed(RawStorage),
    Pod(Mutex<PodArena>),
    Executable(ExecutableStorage),
    Array(ArrayStorage),
}

impl Payload {
    fn kind(&self) -> MemoryBlockKind {
        match self {
            Payload::Fixed(_) => MemoryBlockKind::Fixed,
            Payload::Pod(_) => MemoryBlockKind::Pod,
            Payload::Executable(_) => MemoryBlockKind::Executable,
            Payload::Array(_) => MemoryBlockKind::Array,
        }
    }
}

struct BlockInner {
    refcount: AtomicUsize,
    payload: Payload,
}

/// Shared handle to a memory block. `Clone` retains, `Drop` releases.
pub struct MemoryBlockRef {
    ptr: NonNull<BlockInner>,
    _owns: PhantomData<BlockInner>,
}

// SAFETY: the count is atomic and every payload kind is either immutable
// after construction or guarded (pod arena and hooks by a mutex, array
// binding by a `OnceLock`).
unsafe impl Send for MemoryBlockRef {}
// SAFETY: see `Send`.
unsafe impl Sync for MemoryBlockRef {}

impl MemoryBlockRef {
    /// Allocate a block with a reference count of one.
    ///
    /// For [`MemoryBlockKind::Pod`] `size` is the initial arena capacity; for
    /// [`MemoryBlockKind::Array`] it is the data size with no metadata region
    /// (use [`MemoryBlockRef::allocate_array`] to reserve metadata).
    pub fn allocate(kind: MemoryBlockKind, size: usize, alignment: usize) -> Result<Self, AllocError> {
        let payload = match kind {
            MemoryBlockKind::Fixed => Payload::Fixed(RawStorage::zeroed(size, alignment)?),
            MemoryBlockKind::Pod => Payload::Pod(Mutex::new(PodArena::new(size)?)),
            MemoryBlockKind::Executable => {
                Payload::Executable(ExecutableStorage::new(RawStorage::zeroed(size, alignment)?))
            }
            MemoryBlockKind::Array => Payload::Array(ArrayStorage::new(0, size, alignment)?),
        };
        Ok(Self::from_payload(payload))
    }

    /// Allocate an uninitialized array block with room for `metadata_size`
    /// bytes of metadata followed by `data_size` bytes of data.
    pub fn allocate_array(
        metadata_size: usize,
        data_size: usize,
        data_alignment: usize,
    ) -> Result<Self, AllocError> {
        let storage = ArrayStorage::new(metadata_size, data_size, data_alignment)?;
        Ok(Self::from_payload(Payload::Array(storage)))
    }

    /// Empty pod block, growing on first allocation.
    pub fn new_pod() -> Result<Self, AllocError> {
        Self::allocate(MemoryBlockKind::Pod, 0, 1)
    }

    fn from_payload(payload: Payload) -> Self {
        let inner = Box::new(BlockInner {
            refcount: AtomicUsize::new(1),
            payload,
        });
        Self {
            ptr: NonNull::from(Box::leak(inner)),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn inner(&self) -> &BlockInner {
        // SAFETY: a live handle keeps the count above zero, so the block exists.
        unsafe { self.ptr.as_ref() }
    }

    pub fn kind(&self) -> MemoryBlockKind {
        self.inner().payload.kind()
    }

    /// Current number of handles. Racy by nature; for tests and diagnostics.
    pub fn use_count(&self) -> usize {
        self.inner().refcount.load(Ordering::Acquire)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }

    /// Raw range of a fixed or executable block.
    pub fn storage(&self) -> Result<(NonNull<u8>, usize), AllocError> {
        match &self.inner().payload {
            Payload::Fixed(raw) => Ok((raw.non_null(), raw.len())),
            Payload::Executable(exec) => Ok((exec.code.non_null(), exec.code.len())),
            other => Err(AllocError::WrongKind {
                expected: MemoryBlockKind::Fixed,
                actual: other.kind(),
            }),
        }
    }

    /// Carve `size` bytes out of a pod block. The memory stays valid until
    /// [`MemoryBlockRef::pod_reset`] or until the block is freed.
    pub fn pod_allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        self.pod()?.lock().allocate(size, align)
    }

    /// Drop every pod allocation at once, keeping the largest chunk for reuse.
    pub fn pod_reset(&self) -> Result<(), AllocError> {
        self.pod()?.lock().reset();
        Ok(())
    }

    /// Bytes handed out since the last reset; zero for other kinds.
    pub fn pod_bytes_in_use(&self) -> usize {
        self.pod().map_or(0, |arena| arena.lock().bytes_in_use())
    }

    pub fn pod_chunk_count(&self) -> usize {
        self.pod().map_or(0, |arena| arena.lock().chunk_count())
    }

    fn pod(&self) -> Result<&Mutex<PodArena>, AllocError> {
        match &self.inner().payload {
            Payload::Pod(arena) => Ok(arena),
            other => Err(AllocError::WrongKind {
                expected: MemoryBlockKind::Pod,
                actual: other.kind(),
            }),
        }
    }

    /// Register a hook that must run before executable memory is freed.
    pub fn register_deregistration(&self, hook: impl FnOnce() + Send + 'static) -> Result<(), AllocError> {
        match &self.inner().payload {
            Payload::Executable(exec) => {
                exec.push_hook(Box::new(hook));
                Ok(())
            }
            other => Err(AllocError::WrongKind {
                expected: MemoryBlockKind::Executable,
                actual: other.kind(),
            }),
        }
    }

    fn array(&self) -> Result<&ArrayStorage, AllocError> {
        match &self.inner().payload {
            Payload::Array(array) => Ok(array),
            other => Err(AllocError::WrongKind {
                expected: MemoryBlockKind::Array,
                actual: other.kind(),
            }),
        }
    }

    /// Start of the metadata region of an array block.
    pub fn array_metadata(&self) -> Result<NonNull<u8>, AllocError> {
        Ok(self.array()?.metadata())
    }

    /// Start of the data region stored inline after the metadata.
    pub fn array_inline_data(&self) -> Result<NonNull<u8>, AllocError> {
        Ok(self.array()?.inline_data())
    }

    /// Mark the array block initialized. Fails if it already was.
    pub fn bind_array(&self, binding: ArrayBinding) -> Result<(), AllocError> {
        self.array()?.bind(binding)
    }

    pub fn array_binding(&self) -> Option<&ArrayBinding> {
        self.array().ok().and_then(ArrayStorage::binding)
    }

    pub fn is_initialized(&self) -> bool {
        self.array_binding().is_some()
    }
}

impl Clone for MemoryBlockRef {
    fn clone(&self) -> Self {
        // New handles are created from existing ones, so no ordering is needed.
        let old = self.inner().refcount.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
        Self {
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }
}

impl Drop for MemoryBlockRef {
    fn drop(&mut self) {
        let previous = self.inner().refcount.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "memory block released more times than retained");
        if previous != 1 {
            return;
        }
        atomic::fence(Ordering::Acquire);
        tracing::trace!(kind = %self.kind(), "freeing memory block");
        // SAFETY: this was the last handle; the fence orders every other
        // holder's accesses before the free.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl fmt::Debug for MemoryBlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlockRef")
            .field("kind", &self.kind())
            .field("use_count", &self.use_count())
            .finish_non_exhaustive()
    }
}
