//! The extended type catalogue.
//!
//! | type            | data                  | metadata                          |
//! |-----------------|-----------------------|-----------------------------------|
//! | `strided_dim`   | none of its own       | size, stride, element metadata    |
//! | `fixed_dim`     | `size * element`      | element metadata                  |
//! | `var_dim`       | begin pointer, size   | owning block, stride, offset, ... |
//! | `string`        | begin, end pointers   | owning block                      |
//! | `categorical`   | u8/u16/u32 index      | none                              |
//! | `convert`       | operand's             | operand's                         |
//! | `pointer`       | target address        | owning block, offset, target's    |
//! | `struct`        | fields at offsets     | fields' at 8-aligned offsets      |
//! | `groupby`       | operand struct's      | operand struct's                  |

mod categorical;
mod convert;
mod fixed_dim;
mod groupby;
mod pointer;
mod strided_dim;
mod string;
mod structs;
mod var_dim;

use std::mem::size_of;

use nd_ckernel::{make_strided_dim_kernel, AssignErrorMode, KernelBuilder, KernelRequest};

pub use categorical::{make_categorical, make_categorical_of, make_string_categorical, CategoricalType};
pub use convert::{make_convert, ConvertType};
pub use fixed_dim::{make_fixed_dim, FixedDimType};
pub use groupby::{groupby, make_groupby, GroupByType};
pub use pointer::{make_pointer, make_void_pointer, PointerMeta, PointerType, VoidPointerType};
pub use strided_dim::{make_strided_dim, make_strided_dim_n, StridedDimMeta, StridedDimType};
pub use string::{make_string, string_bytes, write_string, StringData, StringMeta, StringType};
pub use structs::{make_struct, StructType};
pub use var_dim::{make_var_dim, VarDimData, VarDimMeta, VarDimType};

use crate::assign::compile_assignment;
use crate::{EvalContext, NdError, NdType, TypeId};

/// A strided or fixed dimension resolved against its metadata.
pub(crate) struct DimView<'a> {
    pub size: usize,
    pub stride: isize,
    pub element_tp: &'a NdType,
    pub element_md: *const u8,
}

/// Size, stride and element of the outer dimension of `tp`, if it has a
/// static (strided or fixed) one.
///
/// # Safety
///
/// `md` must be constructed metadata for `tp`.
pub(crate) unsafe fn dim_view(tp: &NdType, md: *const u8) -> Option<DimView<'_>> {
    if let Some(strided) = tp.downcast::<StridedDimType>() {
        let meta = &*md.cast::<StridedDimMeta>();
        return Some(DimView {
            size: meta.size,
            stride: meta.stride,
            element_tp: strided.element_type(),
            element_md: md.add(size_of::<StridedDimMeta>()),
        });
    }
    let fixed = tp.downcast::<FixedDimType>()?;
    Some(DimView {
        size: fixed.size(),
        stride: fixed.stride() as isize,
        element_tp: fixed.element_type(),
        element_md: md,
    })
}

/// Element type of any dimension type.
pub(crate) fn dim_element(tp: &NdType) -> Option<&NdType> {
    match tp.type_id() {
        TypeId::StridedDim => tp.downcast::<StridedDimType>().map(StridedDimType::element_type),
        TypeId::FixedDim => tp.downcast::<FixedDimType>().map(FixedDimType::element_type),
        TypeId::VarDim => tp.downcast::<VarDimType>().map(VarDimType::element_type),
        _ => None,
    }
}

/// Lossless when both sides are dimensions with lossless elements.
pub(crate) fn dims_lossless(dst: &NdType, src: &NdType) -> bool {
    match (dim_element(dst), dim_element(src)) {
        (Some(d), Some(s)) => crate::is_lossless_assignment(d, s),
        _ => false,
    }
}

/// Assignment into a strided or fixed destination dimension.
///
/// A source of lower rank broadcasts with stride 0, as does a source
/// dimension of size 1. Variable-length sources are handled by `var_dim`.
#[expect(clippy::too_many_arguments, reason = "forwards compile_assignment")]
pub(crate) fn make_dim_assignment_kernel(
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
    // SAFETY: compile callers pass metadata constructed for their types.
    let Some(dst) = (unsafe { dim_view(dst_tp, dst_md) }) else {
        return Err(NdError::broadcast(dst_tp, src_tp));
    };
    if src_tp.ndim() > dst_tp.ndim() {
        return Err(NdError::broadcast(dst_tp, src_tp));
    }
    if src_tp.ndim() == dst_tp.ndim() && src_tp.type_id() == TypeId::VarDim {
        return var_dim::make_var_to_static_kernel(ckb, offset, dst_tp, dst_md, src_tp, src_md, request, errmode, ectx);
    }

    let (src_stride, src_element_tp, src_element_md) = if src_tp.ndim() < dst_tp.ndim() {
        (0, src_tp, src_md)
    } else {
        // SAFETY: as above.
        let Some(src) = (unsafe { dim_view(src_tp, src_md) }) else {
            return Err(NdError::broadcast(dst_tp, src_tp));
        };
        let stride = if src.size == dst.size {
            src.stride
        } else if src.size == 1 {
            0
        } else {
            return Err(NdError::broadcast(dst_tp, src_tp));
        };
        (stride, src.element_tp, src.element_md)
    };

    tracing::trace!(size = dst.size, dst_stride = dst.stride, src_stride, "dimension kernel");
    let child = make_strided_dim_kernel(ckb, offset, request, dst.size, dst.stride, src_stride)?;
    compile_assignment(
        ckb,
        child,
        dst.element_tp,
        dst.element_md,
        src_element_tp,
        src_element_md,
        KernelRequest::Strided,
        errmode,
        ectx,
    )
}

