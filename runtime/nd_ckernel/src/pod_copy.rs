//! Raw byte copies for identical layouts.

use std::mem::size_of;
use std::ptr;

use crate::builder::KernelBuilder;
use crate::prefix::{KernelOp, KernelPrefix, KernelRecord};
use crate::{ConversionError, KernelError, KernelRequest};

unsafe fn aligned_single<T: Copy>(dst: *mut u8, src: *const u8, _ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    dst.cast::<T>().write(src.cast::<T>().read());
    Ok(())
}

unsafe fn aligned_strided<T: Copy>(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    for _ in 0..count {
        dst.cast::<T>().write(src.cast::<T>().read());
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

unsafe fn unaligned_single<const N: usize>(
    dst: *mut u8,
    src: *const u8,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    ptr::copy_nonoverlapping(src, dst, N);
    Ok(())
}

unsafe fn unaligned_strided<const N: usize>(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    _ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    for _ in 0..count {
        ptr::copy_nonoverlapping(src, dst, N);
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

/// Copy of an arbitrary number of bytes.
#[repr(C)]
struct SizedCopyKernel {
    base: KernelPrefix,
    data_size: usize,
}

// SAFETY: repr(C), prefix first.
unsafe impl KernelRecord for SizedCopyKernel {}

unsafe fn sized_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let size = (*ckp.cast::<SizedCopyKernel>()).data_size;
    ptr::copy_nonoverlapping(src, dst, size);
    Ok(())
}

unsafe fn sized_strided(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    count: usize,
    ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    let size = (*ckp.cast::<SizedCopyKernel>()).data_size;
    for _ in 0..count {
        ptr::copy_nonoverlapping(src, dst, size);
        dst = dst.wrapping_offset(dst_stride);
        src = src.wrapping_offset(src_stride);
    }
    Ok(())
}

fn fixed_width_op(data_size: usize, aligned: bool, request: KernelRequest) -> Option<KernelOp> {
    use KernelRequest::{Single, Strided};
    let op = match (data_size, aligned, request) {
        (1, _, Single) => KernelOp::Single(aligned_single::<u8>),
        (1, _, Strided) => KernelOp::Strided(aligned_strided::<u8>),
        (2, true, Single) => KernelOp::Single(aligned_single::<u16>),
        (2, true, Strided) => KernelOp::Strided(aligned_strided::<u16>),
        (4, true, Single) => KernelOp::Single(aligned_single::<u32>),
        (4, true, Strided) => KernelOp::Strided(aligned_strided::<u32>),
        (8, true, Single) => KernelOp::Single(aligned_single::<u64>),
        (8, true, Strided) => KernelOp::Strided(aligned_strided::<u64>),
        (2, false, Single) => KernelOp::Single(unaligned_single::<2>),
        (2, false, Strided) => KernelOp::Strided(unaligned_strided::<2>),
        (4, false, Single) => KernelOp::Single(unaligned_single::<4>),
        (4, false, Strided) => KernelOp::Strided(unaligned_strided::<4>),
        (8, false, Single) => KernelOp::Single(unaligned_single::<8>),
        (8, false, Strided) => KernelOp::Strided(unaligned_strided::<8>),
        _ => return None,
    };
    Some(op)
}

/// Raw copy of `data_size` bytes per element.
///
/// Widths 1, 2, 4 and 8 whose alignment equals their size use native loads;
/// the same widths with weaker alignment use fixed-size byte copies; anything
/// else stores the size in the record.
pub fn make_pod_assignment_kernel(
    ckb: &mut KernelBuilder,
    offset: usize,
    data_size: usize,
    data_alignment: usize,
    request: KernelRequest,
) -> Result<usize, KernelError> {
    tracing::trace!(data_size, data_alignment, ?request, offset, "pod copy kernel");
    if let Some(op) = fixed_width_op(data_size, data_alignment == data_size, request) {
        return ckb.set_operation(offset, op);
    }
    let op = match request {
        KernelRequest::Single => KernelOp::Single(sized_single),
        KernelRequest::Strided => KernelOp::Strided(sized_strided),
    };
    ckb.emplace(
        offset,
        SizedCopyKernel {
            base: KernelPrefix::new(op, None),
            data_size,
        },
    )
}

/// Size of the record [`make_pod_assignment_kernel`] emits for this layout.
pub fn pod_assignment_kernel_size(data_size: usize, data_alignment: usize) -> usize {
    if fixed_width_op(data_size, data_alignment == data_size, KernelRequest::Single).is_some() {
        size_of::<KernelPrefix>()
    } else {
        size_of::<SizedCopyKernel>()
    }
}
