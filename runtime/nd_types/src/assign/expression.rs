//! Assignments where either side is an expression type.
//!
//! An expression type converts between its stored operand and its logical
//! value through two hooks. When a conversion needs more than one hop the
//! chain passes through a scratch buffer: a [`BufferedKernel`] runs its first
//! child into the buffer, its second child out of it, and then releases any
//! temporary allocations the buffer's metadata accumulated.

use std::ptr;

use nd_ckernel::{
    align_offset, AssignErrorMode, ConversionError, KernelBuilder, KernelOp, KernelPrefix, KernelRecord,
    KernelRequest, KERNEL_ALIGN,
};

use super::compile_assignment;
use crate::{EvalContext, ExtendedType, Metadata, NdError, NdType, TypeFlags};

/// Elements a strided buffered kernel converts per pass.
pub const BUFFER_CHUNK_SIZE: usize = 128;

/// Two-stage conversion through a scratch buffer stored in the arena.
///
/// Layout, relative to the record: the record, the first child, the buffer
/// data, the second child.
#[repr(C)]
pub struct BufferedKernel {
    base: KernelPrefix,
    first_offset: usize,
    second_offset: usize,
    buffer_data_offset: usize,
    buffer_data_size: usize,
    buffer_stride: usize,
    zero_init: bool,
    buffer_md: Metadata,
}

// SAFETY: repr(C), prefix first, alignment 8.
unsafe impl KernelRecord for BufferedKernel {}

impl BufferedKernel {
    pub fn buffer_type(&self) -> &NdType {
        self.buffer_md.get_type()
    }

    pub fn buffer_metadata(&self) -> &Metadata {
        &self.buffer_md
    }

    /// Elements the buffer holds.
    pub fn capacity(&self) -> usize {
        if self.buffer_stride == 0 {
            0
        } else {
            self.buffer_data_size / self.buffer_stride
        }
    }
}

unsafe fn buffered_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<BufferedKernel>();
    let buffer = ckp.cast::<u8>().add(e.buffer_data_offset);
    if e.zero_init {
        ptr::write_bytes(buffer, 0, e.buffer_data_size);
    }
    let first = KernelPrefix::child(ckp, e.first_offset);
    let second = KernelPrefix::child(ckp, e.second_offset);
    let result = KernelPrefix::call_single(first, buffer, src).and_then(|()| KernelPrefix::call_single(second, dst, buffer));
    e.buffer_md.reset_buffers();
    result
}

unsafe fn buffered_strided(
    mut dst: *mut u8,
    dst_stride: isize,
    mut src: *const u8,
    src_stride: isize,
    mut count: usize,
    ckp: *mut KernelPrefix,
) -> Result<(), ConversionError> {
    let e = &*ckp.cast::<BufferedKernel>();
    let buffer = ckp.cast::<u8>().add(e.buffer_data_offset);
    let stride = e.buffer_stride as isize;
    let first = KernelPrefix::child(ckp, e.first_offset);
    let second = KernelPrefix::child(ckp, e.second_offset);
    while count > 0 {
        let chunk = count.min(BUFFER_CHUNK_SIZE);
        if e.zero_init {
            ptr::write_bytes(buffer, 0, chunk * e.buffer_stride);
        }
        let result = KernelPrefix::call_strided(first, buffer, stride, src, src_stride, chunk)
            .and_then(|()| KernelPrefix::call_strided(second, dst, dst_stride, buffer, stride, chunk));
        e.buffer_md.reset_buffers();
        result?;
        dst = dst.wrapping_offset(dst_stride * chunk as isize);
        src = src.wrapping_offset(src_stride * chunk as isize);
        count -= chunk;
    }
    Ok(())
}

unsafe fn buffered_destruct(ckp: *mut KernelPrefix) {
    let (first, second) = {
        let e = &*ckp.cast::<BufferedKernel>();
        (e.first_offset, e.second_offset)
    };
    // Children may point into the buffer metadata; they go first.
    KernelPrefix::destroy_child(ckp, first);
    KernelPrefix::destroy_child(ckp, second);
    ptr::drop_in_place(ckp.cast::<BufferedKernel>());
}

/// Emit `dst <- buffer <- src` at `offset`.
///
/// `first` compiles `buffer <- src` and `second` compiles `dst <- buffer`;
/// each receives the builder, its offset and the buffer metadata pointer.
pub(crate) fn make_buffered_kernel(
    ckb: &mut KernelBuilder,
    offset: usize,
    buffer_tp: &NdType,
    request: KernelRequest,
    first: impl FnOnce(&mut KernelBuilder, usize, *const u8) -> Result<usize, NdError>,
    second: impl FnOnce(&mut KernelBuilder, usize, *const u8) -> Result<usize, NdError>,
) -> Result<usize, NdError> {
    let stride = buffer_tp.data_size();
    if stride == 0 {
        return Err(NdError::layout(format!("cannot buffer values of variable-size type {buffer_tp}")));
    }
    let buffer_md = Metadata::new(buffer_tp, &[])?;
    let md_ptr = buffer_md.as_ptr();
    let count = match request {
        KernelRequest::Single => 1,
        KernelRequest::Strided => BUFFER_CHUNK_SIZE,
    };
    let buffer_data_size = align_offset(count * stride, 8);
    let op = match request {
        KernelRequest::Single => KernelOp::Single(buffered_single),
        KernelRequest::Strided => KernelOp::Strided(buffered_strided),
    };
    tracing::trace!(buffer = %buffer_tp, offset, buffer_data_size, "buffered kernel");

    let end = ckb.emplace(
        offset,
        BufferedKernel {
            base: KernelPrefix::new(op, Some(buffered_destruct)),
            first_offset: 0,
            second_offset: 0,
            buffer_data_offset: 0,
            buffer_data_size,
            buffer_stride: stride,
            zero_init: buffer_tp.flags().contains(TypeFlags::ZEROINIT),
            buffer_md,
        },
    )?;

    let first_at = align_offset(end, KERNEL_ALIGN);
    ckb.ensure_capacity_leaf(first_at)?;
    // SAFETY: emplaced above; offsets are only recorded once space exists.
    unsafe { ckb.get_at::<BufferedKernel>(offset) }?.first_offset = first_at - offset;
    let first_end = first(ckb, first_at, md_ptr)?;

    let data_at = align_offset(first_end, KERNEL_ALIGN);
    let second_at = align_offset(data_at + buffer_data_size, KERNEL_ALIGN);
    ckb.ensure_capacity_leaf(second_at)?;
    {
        // SAFETY: as above; children never overwrite their parent.
        let e = unsafe { ckb.get_at::<BufferedKernel>(offset) }?;
        e.buffer_data_offset = data_at - offset;
        e.second_offset = second_at - offset;
    }
    second(ckb, second_at, md_ptr)
}

fn expression_of(tp: &NdType) -> Option<&dyn ExtendedType> {
    tp.extended().filter(|_| tp.is_expression())
}

#[expect(clippy::too_many_arguments, reason = "forwards compile_assignment")]
pub(super) fn make_expression_assignment_kernel(
    ckb: &mut KernelBuilder,
    offset: usize,
    dst_tp: &NdType,
    dst_md: *const u8,
    src_tp: &NdType,
    src_md: *const u8,
    request: KernelRequest,
    errmode: AssignErrorMode,
    ectx: &EvalContext,
) -> Result<usize, NdError> {
    if let Some(dst_ext) = expression_of(dst_tp) {
        let dst_value = dst_tp.value_type();
        if src_tp == dst_value {
            let operand = dst_tp.operand_type();
            if !operand.is_expression() {
                return dst_ext.make_value_to_operand_assignment_kernel(ckb, offset, dst_md, src_md, request, ectx);
            }
            // value -> operand's value -> operand
            let buffer_tp = operand.value_type().clone();
            return make_buffered_kernel(
                ckb,
                offset,
                &buffer_tp,
                request,
                |ckb, at, buf_md| dst_ext.make_value_to_operand_assignment_kernel(ckb, at, buf_md, src_md, request, ectx),
                |ckb, at, buf_md| compile_assignment(ckb, at, operand, dst_md, &buffer_tp, buf_md, request, errmode, ectx),
            );
        }
        let buffer_tp = if src_tp.is_expression() {
            src_tp.value_type().clone()
        } else {
            dst_value.clone()
        };
        return buffer_through(ckb, offset, dst_tp, dst_md, src_tp, src_md, &buffer_tp, request, errmode, ectx);
    }

    let Some(src_ext) = expression_of(src_tp) else {
        return Err(NdError::incompatible(dst_tp, src_tp));
    };
    let src_value = src_tp.value_type();
    if dst_tp == src_value {
        let operand = src_tp.operand_type();
        if !operand.is_expression() {
            return src_ext.make_operand_to_value_assignment_kernel(ckb, offset, dst_md, src_md, request, ectx);
        }
        // operand -> operand's value -> value
        let buffer_tp = operand.value_type().clone();
        return make_buffered_kernel(
            ckb,
            offset,
            &buffer_tp,
            request,
            |ckb, at, buf_md| compile_assignment(ckb, at, &buffer_tp, buf_md, operand, src_md, request, errmode, ectx),
            |ckb, at, buf_md| src_ext.make_operand_to_value_assignment_kernel(ckb, at, dst_md, buf_md, request, ectx),
        );
    }
    let buffer_tp = src_value.clone();
    buffer_through(ckb, offset, dst_tp, dst_md, src_tp, src_md, &buffer_tp, request, errmode, ectx)
}

/// `dst <- buffer_tp <- src` with ordinary compiles on both sides.
#[expect(clippy::too_many_arguments, reason = "forwards compile_assignment")]
fn buffer_through(
    ckb: &mut KernelBuilder,
    offset: usize,
    dst_tp: &NdType,
    dst_md: *const u8,
    src_tp: &NdType,
    src_md: *const u8,
    buffer_tp: &NdType,
    request: KernelRequest,
    errmode: AssignErrorMode,
    ectx: &EvalContext,
) -> Result<usize, NdError> {
    make_buffered_kernel(
        ckb,
        offset,
        buffer_tp,
        request,
        |ckb, at, buf_md| compile_assignment(ckb, at, buffer_tp, buf_md, src_tp, src_md, request, errmode, ectx),
        |ckb, at, buf_md| compile_assignment(ckb, at, dst_tp, dst_md, buffer_tp, buf_md, request, errmode, ectx),
    )
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, size_of};

    use super::*;

    #[test]
    fn record_fits_arena_alignment() {
        assert!(align_of::<BufferedKernel>() <= KERNEL_ALIGN);
        assert!(size_of::<BufferedKernel>() > size_of::<KernelPrefix>());
    }
}
