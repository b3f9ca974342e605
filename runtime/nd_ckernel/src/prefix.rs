//! The common header every kernel record starts with.

use std::fmt;

use crate::{ConversionError, ConversionErrorKind};

/// Converts one element.
pub type SingleFn =
    unsafe fn(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError>;

/// Converts `count` elements at the given byte strides.
pub type StridedFn = unsafe fn(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    count: usize,
    ckp: *mut KernelPrefix,
) -> Result<(), ConversionError>;

/// Releases a record's state and every child record it owns.
pub type DestructFn = unsafe fn(ckp: *mut KernelPrefix);

/// The function a record runs, tagged by execution shape.
#[derive(Clone, Copy)]
pub enum KernelOp {
    Single(SingleFn),
    Strided(StridedFn),
}

/// Marks a `#[repr(C)]` record whose first field is a [`KernelPrefix`].
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, start with a `KernelPrefix`, and have
/// an alignment no larger than [`crate::KERNEL_ALIGN`].
pub unsafe trait KernelRecord: Sized {}

/// Function slots shared by every record. All-zero bytes are a valid empty
/// prefix, which is what fresh arena space holds.
#[repr(C)]
#[derive(Default)]
pub struct KernelPrefix {
    single: Option<SingleFn>,
    strided: Option<StridedFn>,
    destructor: Option<DestructFn>,
}

// SAFETY: repr(C) and is its own prefix.
unsafe impl KernelRecord for KernelPrefix {}

impl KernelPrefix {
    pub fn new(op: KernelOp, destructor: Option<DestructFn>) -> Self {
        let mut prefix = Self {
            destructor,
            ..Self::default()
        };
        prefix.set_operation(op);
        prefix
    }

    pub fn set_operation(&mut self, op: KernelOp) {
        match op {
            KernelOp::Single(f) => self.single = Some(f),
            KernelOp::Strided(f) => self.strided = Some(f),
        }
    }

    pub fn set_destructor(&mut self, destructor: Option<DestructFn>) {
        self.destructor = destructor;
    }

    pub fn has_single(&self) -> bool {
        self.single.is_some()
    }

    pub fn has_strided(&self) -> bool {
        self.strided.is_some()
    }

    pub fn has_destructor(&self) -> bool {
        self.destructor.is_some()
    }

    /// Record at `offset` bytes past `this`.
    ///
    /// # Safety
    ///
    /// `offset` must address a record inside the same arena.
    #[inline]
    pub unsafe fn child(this: *mut KernelPrefix, offset: usize) -> *mut KernelPrefix {
        this.cast::<u8>().add(offset).cast()
    }

    /// # Safety
    ///
    /// `this` must be a live record whose single function accepts these
    /// pointers.
    #[inline]
    pub unsafe fn call_single(
        this: *mut KernelPrefix,
        dst: *mut u8,
        src: *const u8,
    ) -> Result<(), ConversionError> {
        let f = (*this).single.unwrap_or(unset_single);
        f(dst, src, this)
    }

    /// # Safety
    ///
    /// `this` must be a live record whose strided function accepts these
    /// pointers, strides and count.
    #[inline]
    pub unsafe fn call_strided(
        this: *mut KernelPrefix,
        dst: *mut u8,
        dst_stride: isize,
        src: *const u8,
        src_stride: isize,
        count: usize,
    ) -> Result<(), ConversionError> {
        let f = (*this).strided.unwrap_or(unset_strided);
        f(dst, dst_stride, src, src_stride, count, this)
    }

    /// Run and clear the destructor. A second call is a no-op.
    ///
    /// # Safety
    ///
    /// `this` must point at an initialized record.
    pub unsafe fn destroy(this: *mut KernelPrefix) {
        if let Some(destructor) = (*this).destructor.take() {
            destructor(this);
        }
    }

    /// Destroy the child at `offset`; offset zero means "never built".
    ///
    /// # Safety
    ///
    /// Same as [`KernelPrefix::child`] and [`KernelPrefix::destroy`].
    pub unsafe fn destroy_child(this: *mut KernelPrefix, offset: usize) {
        if offset != 0 {
            Self::destroy(Self::child(this, offset));
        }
    }
}

impl fmt::Debug for KernelPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelPrefix")
            .field("single", &self.single.is_some())
            .field("strided", &self.strided.is_some())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

#[cold]
fn unset_single(_dst: *mut u8, _src: *const u8, _ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    Err(ConversionError::new(
        ConversionErrorKind::UnsetKernel,
        "record was not compiled for single-element execution",
    ))
}

#[cold]
fn unset_strided(
    _dst: *mut u8,
    _dst_stride: isize,
    _src: *const u8,
    _src_stride: isize,
    _count: usize,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    Err(ConversionError::new(
        ConversionErrorKind::UnsetKernel,
        "record was not compiled for strided execution",
    ))
}
