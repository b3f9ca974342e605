//! Shape adapters: running single-element children over strided runs, and
//! stepping one dimension at a time.

use std::mem::size_of;

use crate::builder::KernelBuilder;
use crate::prefix::{KernelOp, KernelPrefix, KernelRecord};
use crate::{ConversionError, KernelError, KernelRequest};

const CHILD: usize = size_of::<KernelPrefix>();

unsafe fn strided_via_single(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    let child = KernelPrefix::child(ckp, CHILD);
    for _ in 0..count {
        KernelPrefix::call_single(child, dst, src)?;
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

unsafe fn adapter_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, CHILD);
}

/// Let a factory that only builds single-element kernels satisfy `request`.
///
/// For `Single` this is a no-op returning `offset`. For `Strided` it emits a
/// looping record and returns the offset where the single-element child must
/// be built.
pub fn make_kernreq_to_single_kernel_adapter(
    ckb: &mut KernelBuilder,
    offset: usize,
    request: KernelRequest,
) -> Result<usize, KernelError> {
    match request {
        KernelRequest::Single => Ok(offset),
        KernelRequest::Strided => {
            let child = ckb.emplace(
                offset,
                KernelPrefix::new(KernelOp::Strided(strided_via_single), Some(adapter_destruct)),
            )?;
            ckb.ensure_capacity_leaf(child)?;
            Ok(child)
        }
    }
}

/// Iterates one dimension, running a strided child over each inner run.
#[repr(C)]
pub struct StridedDimKernel {
    base: KernelPrefix,
    size: usize,
    dst_stride: isize,
    src_stride: isize,
}

// SAFETY: repr(C), prefix first.
unsafe impl KernelRecord for StridedDimKernel {}

const DIM_CHILD: usize = size_of::<StridedDimKernel>();

unsafe fn dim_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<StridedDimKernel>();
    let child = KernelPrefix::child(ckp, DIM_CHILD);
    KernelPrefix::call_strided(child, dst, e.dst_stride, src, e.src_stride, e.size)
}

unsafe fn dim_strided(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    let (size, inner_dst, inner_src) = {
        let e = &*ckp.cast::<StridedDimKernel>();
        (e.size, e.dst_stride, e.src_stride)
    };
    let child = KernelPrefix::child(ckp, DIM_CHILD);
    for _ in 0..count {
        KernelPrefix::call_strided(child, dst, inner_dst, src, inner_src, size)?;
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

unsafe fn dim_destruct(ckp: *mut KernelPrefix) {
    KernelPrefix::destroy_child(ckp, DIM_CHILD);
}

/// Emit a dimension loop of `size` elements. Returns the offset of the child,
/// which must be compiled for [`KernelRequest::Strided`].
pub fn make_strided_dim_kernel(
    ckb: &mut KernelBuilder,
    offset: usize,
    request: KernelRequest,
    size: usize,
    dst_stride: isize,
    src_stride: isize,
) -> Result<usize, KernelError> {
    let op = match request {
        KernelRequest::Single => KernelOp::Single(dim_single),
        KernelRequest::Strided => KernelOp::Strided(dim_strided),
    };
    let child = ckb.emplace(
        offset,
        StridedDimKernel {
            base: KernelPrefix::new(op, Some(dim_destruct)),
            size,
            dst_stride,
            src_stride,
        },
    )?;
    ckb.ensure_capacity_leaf(child)?;
    Ok(child)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{compile_builtin_assignment, AssignErrorMode, BuiltinType};

    #[test]
    fn single_adapter_is_a_no_op() {
        let mut ckb = KernelBuilder::new();
        assert_eq!(make_kernreq_to_single_kernel_adapter(&mut ckb, 32, KernelRequest::Single), Ok(32));
        assert!(!ckb.record_at(32).unwrap().has_single());
    }

    #[test]
    fn strided_adapter_loops_single_child() {
        let mut ckb = KernelBuilder::new();
        let child = make_kernreq_to_single_kernel_adapter(&mut ckb, 0, KernelRequest::Strided).unwrap();
        assert_eq!(child, CHILD);
        compile_builtin_assignment(
            &mut ckb,
            child,
            BuiltinType::Int64,
            BuiltinType::UInt8,
            KernelRequest::Single,
            AssignErrorMode::None,
        )
        .unwrap();

        let src = [1u8, 2, 3, 4];
        let mut dst = [0i64; 2];
        unsafe { ckb.call_strided(dst.as_mut_ptr().cast(), 8, src.as_ptr(), 2, 2) }.unwrap();
        assert_eq!(dst, [1, 3]);
    }

    #[test]
    fn dim_kernel_walks_two_dimensions() {
        // 2x3 row-major i16 into a transposed 2x3 view of f64.
        let src: [i16; 6] = [1, 2, 3, 4, 5, 6];
        let mut dst = [0f64; 6];
        let mut ckb = KernelBuilder::new();
        let child = make_strided_dim_kernel(&mut ckb, 0, KernelRequest::Strided, 3, 16, 2).unwrap();
        compile_builtin_assignment(
            &mut ckb,
            child,
            BuiltinType::Float64,
            BuiltinType::Int16,
            KernelRequest::Strided,
            AssignErrorMode::Inexact,
        )
        .unwrap();
        unsafe { ckb.call_strided(dst.as_mut_ptr().cast(), 8, src.as_ptr().cast(), 6, 2) }.unwrap();
        assert_eq!(dst, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
