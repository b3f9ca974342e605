//! Type descriptors and the assignment kernel compiler.
//!
//! An [`NdType`] describes how array data is laid out and what per-array
//! *metadata* (sizes, strides, owning blocks) accompanies it. Builtin scalars
//! are plain values; everything else implements [`ExtendedType`] and is
//! shared behind a reference-counted handle.
//!
//! [`compile_assignment`] turns a pair of types plus their metadata into a
//! chain of kernel records (see `nd_ckernel`) that copies or converts data
//! from one layout to the other. Expression types such as
//! [`types::make_convert`] store one type and present another; assigning
//! through them may insert scratch buffers ([`BufferedKernel`]).
//!
//! # Design
//!
//! - Type descriptors are immutable after construction and `Send + Sync`.
//! - Metadata is an untyped 8-aligned byte region each type lays out itself;
//!   all-zero bytes are a valid empty state for every type in this crate.
//! - Kernels hold raw pointers into the metadata they were compiled against.
//!   [`AssignmentKernel`] ties that borrow to a lifetime; lower-level callers
//!   keep metadata alive and unchanged themselves.
//!
//! # Logging
//!
//! Compile decisions are traced at `trace`/`debug` level under the crate's
//! target. Kernels themselves never log. Call [`init_tracing`] to install a
//! subscriber driven by `ND_LOG` (falling back to `RUST_LOG`).

#![allow(unsafe_code, reason = "metadata and kernels operate on raw, type-described memory")]
#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    reason = "sizes and strides convert between usize and isize at data-layout boundaries"
)]
#![allow(clippy::cast_ptr_alignment, reason = "metadata regions are 8-aligned and laid out by their types")]

mod array;
mod assign;
mod error;
mod eval;
mod extended;
mod flags;
mod metadata;
mod ndtype;
mod stack;
mod type_id;
pub mod types;

use std::sync::Once;

pub use array::NdArray;
pub use assign::{compile_assignment, is_lossless_assignment, AssignmentKernel, BufferedKernel, BUFFER_CHUNK_SIZE};
pub use error::NdError;
pub use eval::{DateParseOrder, EvalContext, ParseDateOrderError, CENTURY_WINDOW_ENV, ERRMODE_ENV};
pub use extended::ExtendedType;
pub use flags::TypeFlags;
pub use metadata::{MetaRef, Metadata};
pub use ndtype::NdType;
pub use type_id::{TypeId, TypeKind};

pub use nd_ckernel::{AssignErrorMode, BuiltinType, ConversionError, ConversionErrorKind, KernelBuilder, KernelRequest};

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber when `ND_LOG` or `RUST_LOG` is set.
///
/// Safe to call repeatedly; only the first call has an effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = std::env::var("ND_LOG")
            .ok()
            .map(EnvFilter::new)
            .or_else(|| std::env::var("RUST_LOG").is_ok().then(EnvFilter::from_default_env));
        if let Some(filter) = filter {
            let installed = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
            if let Err(err) = installed {
                // Another subscriber is already global; events still reach it.
                tracing::debug!(%err, "tracing subscriber already installed");
            }
        }
    });
}
