//! Kernel buffers and builtin assignment kernels.
//!
//! An assignment is compiled into a chain of *kernel records* laid out in one
//! [`KernelBuilder`] arena. Each record starts with a [`KernelPrefix`] holding
//! its single-element and strided entry points plus an optional destructor;
//! parent records reach their children through byte offsets relative to
//! themselves.
//!
//! This crate provides the arena and the leaves every chain bottoms out in:
//!
//! - raw POD copies ([`make_pod_assignment_kernel`])
//! - builtin scalar conversions through the static dispatch tables
//!   ([`compile_builtin_assignment`]), for every ordered pair of the 13
//!   builtin kinds and the four error modes
//! - shape adapters ([`make_kernreq_to_single_kernel_adapter`],
//!   [`make_strided_dim_kernel`])
//!
//! Type-directed compilation (dimensions, strings, expressions) lives in
//! `nd_types`, which calls back into these entry points.
//!
//! # Safety model
//!
//! Kernels run on raw pointers supplied by the caller. Compiling is safe;
//! executing is `unsafe` and requires the pointers to match the types and
//! metadata the chain was compiled against.

#![allow(unsafe_code, reason = "kernels are placement-constructed into a raw arena and run on raw element pointers")]
#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    reason = "scalar conversion rules are defined in terms of `as` casts and checked explicitly"
)]
#![allow(clippy::float_cmp, reason = "exactness checks compare floats bit-for-bit on purpose")]
#![allow(clippy::cast_ptr_alignment, reason = "record and element alignment is checked by the builder or guaranteed by the type")]

mod adapter;
mod builder;
mod builtin;
mod errmode;
mod error;
mod lossless;
mod pod_copy;
mod prefix;
mod request;
mod scalar;
mod tables;

pub use adapter::{make_kernreq_to_single_kernel_adapter, make_strided_dim_kernel, StridedDimKernel};
pub use builder::{align_offset, KernelBuilder, INITIAL_CAPACITY, KERNEL_ALIGN};
pub use builtin::{BuiltinType, Complex, BUILTIN_COUNT, FIRST_BUILTIN_ID};
pub use errmode::{AssignErrorMode, ParseErrorModeError, DEFAULT_ERROR_MODE, ERROR_MODE_COUNT};
pub use error::{ConversionError, ConversionErrorKind, KernelError};
pub use lossless::is_lossless_builtin_assignment;
pub use pod_copy::{make_pod_assignment_kernel, pod_assignment_kernel_size};
pub use prefix::{DestructFn, KernelOp, KernelPrefix, KernelRecord, SingleFn, StridedFn};
pub use request::KernelRequest;
pub use scalar::{assign_scalar, BuiltinScalar, ScalarValue};
pub use tables::{builtin_single_fn, builtin_strided_fn, compile_builtin_assignment};
