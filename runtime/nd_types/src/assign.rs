//! The assignment kernel compiler.
//!
//! [`compile_assignment`] turns a `(dst type, dst metadata, src type, src
//! metadata)` pair into a chain of kernel records in a [`KernelBuilder`].
//! Dispatch, in order:
//!
//! 1. `Default` error mode resolves through the [`EvalContext`]; a provably
//!    lossless pair downgrades any checking mode to `None`.
//! 2. Two builtin types: a raw copy when identical, otherwise the static
//!    dispatch table entry.
//! 3. Equal types with fixed-size plain data: a raw copy of the stored
//!    bytes, expression types included.
//! 4. An expression type on either side: the buffered expression chain in
//!    [`expression`].
//! 5. Otherwise the destination's extended factory, or the source's when the
//!    destination is builtin.
//!
//! Every step runs under the stack guard; nested types recurse once per
//! layer.

mod expression;

use std::marker::PhantomData;

use nd_ckernel::{
    compile_builtin_assignment, is_lossless_builtin_assignment, make_pod_assignment_kernel, AssignErrorMode,
    ConversionError, KernelBuilder, KernelError, KernelPrefix, KernelRequest,
};

use crate::stack::ensure_sufficient_stack;
use crate::{EvalContext, MetaRef, NdError, NdType};

pub use expression::{BufferedKernel, BUFFER_CHUNK_SIZE};
pub(crate) use expression::make_buffered_kernel;

/// Compile `dst_tp <- src_tp` at `offset`, returning the offset just past the
/// emitted records.
///
/// A failure at offset 0 resets `ckb`, destroying whatever was partially
/// built. At deeper offsets the enclosing record owns the cleanup.
#[expect(clippy::too_many_arguments, reason = "the compile entry point carries both sides and all options")]
pub fn compile_assignment(
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
    let result = ensure_sufficient_stack(|| {
        dispatch(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx)
    });
    if let Err(err) = &result {
        tracing::debug!(dst = %dst_tp, src = %src_tp, offset, %err, "assignment compile failed");
        if offset == 0 {
            ckb.reset();
        }
    }
    result
}

#[expect(clippy::too_many_arguments, reason = "forwards compile_assignment")]
fn dispatch(
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
    let mut errmode = errmode.resolve(ectx.default_errmode);
    if errmode != AssignErrorMode::None && is_lossless_assignment(dst_tp, src_tp) {
        errmode = AssignErrorMode::None;
    }
    tracing::trace!(dst = %dst_tp, src = %src_tp, %errmode, ?request, offset, "compile assignment");

    match (dst_tp, src_tp) {
        (NdType::Builtin(dst), NdType::Builtin(src)) => {
            let end = if dst == src {
                make_pod_assignment_kernel(ckb, offset, dst.data_size(), dst.alignment(), request)?
            } else {
                compile_builtin_assignment(ckb, offset, *dst, *src, request, errmode)?
            };
            Ok(end)
        }
        _ if dst_tp == src_tp && dst_tp.is_plain_data() => {
            Ok(make_pod_assignment_kernel(ckb, offset, dst_tp.data_size(), dst_tp.alignment(), request)?)
        }
        _ if dst_tp.is_expression() || src_tp.is_expression() => expression::make_expression_assignment_kernel(
            ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx,
        ),
        (NdType::Extended(dst), _) => {
            dst.make_assignment_kernel(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx)
        }
        (_, NdType::Extended(src)) => {
            src.make_assignment_kernel(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx)
        }
    }
}

/// Whether every `src` value is representable in `dst`.
pub fn is_lossless_assignment(dst: &NdType, src: &NdType) -> bool {
    if dst == src {
        return true;
    }
    match (dst, src) {
        (NdType::Builtin(d), NdType::Builtin(s)) => is_lossless_builtin_assignment(*d, *s),
        (NdType::Extended(d), _) => d.is_lossless_assignment(dst, src),
        (_, NdType::Extended(s)) => s.is_lossless_assignment(dst, src),
    }
}

/// A compiled assignment owning its kernel buffer.
///
/// The chain may hold pointers into the metadata it was compiled against, so
/// the kernel borrows that metadata for `'md`.
pub struct AssignmentKernel<'md> {
    ckb: KernelBuilder,
    end: usize,
    request: KernelRequest,
    _metadata: PhantomData<MetaRef<'md>>,
}

impl<'md> AssignmentKernel<'md> {
    pub fn new(
        dst_tp: &NdType,
        dst_md: MetaRef<'md>,
        src_tp: &NdType,
        src_md: MetaRef<'md>,
        request: KernelRequest,
        errmode: AssignErrorMode,
        ectx: &EvalContext,
    ) -> Result<Self, NdError> {
        let mut ckb = KernelBuilder::new();
        let end = compile_assignment(
            &mut ckb,
            0,
            dst_tp,
            dst_md.as_ptr(),
            src_tp,
            src_md.as_ptr(),
            request,
            errmode,
            ectx,
        )?;
        Ok(Self {
            ckb,
            end,
            request,
            _metadata: PhantomData,
        })
    }

    pub fn request(&self) -> KernelRequest {
        self.request
    }

    /// Bytes of kernel buffer the chain occupies.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn root(&mut self) -> Result<&KernelPrefix, KernelError> {
        self.ckb.record_at(0).map(|root| &*root)
    }

    /// Assign one element.
    ///
    /// # Safety
    ///
    /// Compiled for [`KernelRequest::Single`]; `dst` and `src` point at
    /// elements laid out as the compiled types and metadata describe.
    pub unsafe fn single(&mut self, dst: *mut u8, src: *const u8) -> Result<(), ConversionError> {
        debug_assert_eq!(self.request, KernelRequest::Single);
        self.ckb.call_single(dst, src)
    }

    /// Assign `count` elements at the given strides.
    ///
    /// # Safety
    ///
    /// Compiled for [`KernelRequest::Strided`]; every element the strides
    /// reach is laid out as the compiled types and metadata describe.
    pub unsafe fn strided(
        &mut self,
        dst: *mut u8,
        dst_stride: isize,
        src: *const u8,
        src_stride: isize,
        count: usize,
    ) -> Result<(), ConversionError> {
        debug_assert_eq!(self.request, KernelRequest::Strided);
        self.ckb.call_strided(dst, dst_stride, src, src_stride, count)
    }

    /// The underlying buffer, for inspecting records.
    pub fn builder(&mut self) -> &mut KernelBuilder {
        &mut self.ckb
    }
}
