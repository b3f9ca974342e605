//! Builtin dispatch tables.
//!
//! Two static matrices indexed `[dst][src][mode]`, one of single-element and
//! one of strided functions, covering every ordered builtin pair. Entries are
//! monomorphizations of [`convert_raw`], so the tables are plain data baked
//! into the binary with nothing to initialize at run time.

use crate::builder::KernelBuilder;
use crate::builtin::{Complex, BUILTIN_COUNT};
use crate::errmode::ERROR_MODE_COUNT;
use crate::prefix::{KernelOp, KernelPrefix, SingleFn, StridedFn};
use crate::scalar::{convert_raw, BuiltinScalar};
use crate::{AssignErrorMode, BuiltinType, ConversionError, KernelError, KernelRequest};

type SingleTable = [[[SingleFn; ERROR_MODE_COUNT]; BUILTIN_COUNT]; BUILTIN_COUNT];
type StridedTable = [[[StridedFn; ERROR_MODE_COUNT]; BUILTIN_COUNT]; BUILTIN_COUNT];

unsafe fn assign_single<D: BuiltinScalar, S: BuiltinScalar, const MODE: u8>(
    dst: *mut u8,
    src: *const u8,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    convert_raw::<D, S>(dst, src, AssignErrorMode::from_index(MODE))
}

unsafe fn assign_strided<D: BuiltinScalar, S: BuiltinScalar, const MODE: u8>(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    let mode = AssignErrorMode::from_index(MODE);
    for _ in 0..count {
        convert_raw::<D, S>(dst, src, mode)?;
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

macro_rules! mode_row {
    ($f:ident, $fty:ty, $d:ty, $s:ty) => {
        [
            $f::<$d, $s, 0> as $fty,
            $f::<$d, $s, 1> as $fty,
            $f::<$d, $s, 2> as $fty,
            $f::<$d, $s, 3> as $fty,
        ]
    };
}

// Column order must match `BuiltinType::ALL`.
macro_rules! src_row {
    ($f:ident, $fty:ty, $d:ty) => {
        [
            mode_row!($f, $fty, $d, bool),
            mode_row!($f, $fty, $d, i8),
            mode_row!($f, $fty, $d, i16),
            mode_row!($f, $fty, $d, i32),
            mode_row!($f, $fty, $d, i64),
            mode_row!($f, $fty, $d, u8),
            mode_row!($f, $fty, $d, u16),
            mode_row!($f, $fty, $d, u32),
            mode_row!($f, $fty, $d, u64),
            mode_row!($f, $fty, $d, f32),
            mode_row!($f, $fty, $d, f64),
            mode_row!($f, $fty, $d, Complex<f32>),
            mode_row!($f, $fty, $d, Complex<f64>),
        ]
    };
}

macro_rules! dispatch_table {
    ($f:ident, $fty:ty) => {
        [
            src_row!($f, $fty, bool),
            src_row!($f, $fty, i8),
            src_row!($f, $fty, i16),
            src_row!($f, $fty, i32),
            src_row!($f, $fty, i64),
            src_row!($f, $fty, u8),
            src_row!($f, $fty, u16),
            src_row!($f, $fty, u32),
            src_row!($f, $fty, u64),
            src_row!($f, $fty, f32),
            src_row!($f, $fty, f64),
            src_row!($f, $fty, Complex<f32>),
            src_row!($f, $fty, Complex<f64>),
        ]
    };
}

static SINGLE_TABLE: SingleTable = dispatch_table!(assign_single, SingleFn);
static STRIDED_TABLE: StridedTable = dispatch_table!(assign_strided, StridedFn);

#[inline]
pub fn builtin_single_fn(dst: BuiltinType, src: BuiltinType, mode: AssignErrorMode) -> SingleFn {
    SINGLE_TABLE[dst.index()][src.index()][mode.index()]
}

#[inline]
pub fn builtin_strided_fn(dst: BuiltinType, src: BuiltinType, mode: AssignErrorMode) -> StridedFn {
    STRIDED_TABLE[dst.index()][src.index()][mode.index()]
}

/// Install the table entry for `dst <- src` at `offset`.
///
/// `Default` resolves to the library default mode; callers holding an
/// evaluation context resolve it first.
pub fn compile_builtin_assignment(
    ckb: &mut KernelBuilder,
    offset: usize,
    dst: BuiltinType,
    src: BuiltinType,
    request: KernelRequest,
    errmode: AssignErrorMode,
) -> Result<usize, KernelError> {
    let op = match request {
        KernelRequest::Single => KernelOp::Single(builtin_single_fn(dst, src, errmode)),
        KernelRequest::Strided => KernelOp::Strided(builtin_strided_fn(dst, src, errmode)),
    };
    tracing::trace!(%dst, %src, %errmode, ?request, offset, "builtin table kernel");
    ckb.set_operation(offset, op)
}

#[cfg(test)]
mod tests;
