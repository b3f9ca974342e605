use std::fmt;

/// Failure while building a kernel chain.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("unsupported kernel request {0}")]
    UnsupportedKernelRequest(u32),

    #[error("out of memory growing kernel buffer to {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("kernel record offset {offset} is misaligned or out of bounds (capacity {capacity})")]
    InvalidOffset { offset: usize, capacity: usize },
}

/// Why a value could not be converted during kernel execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionErrorKind {
    /// Outside the destination's representable range.
    Overflow,
    /// Non-integral value narrowed to an integer.
    Fractional,
    /// Floating-point precision would be lost.
    Inexact,
    /// Not a member of a categorical or grouping domain.
    OutOfDomain,
    /// Runtime dimension sizes disagree.
    DimensionMismatch,
    /// A destination buffer could not be allocated.
    AllocationFailed,
    /// The record has no function for the requested shape.
    UnsetKernel,
    /// A pointer holds no address.
    NullPointer,
}

impl ConversionErrorKind {
    pub const fn name(self) -> &'static str {
        match self {
            ConversionErrorKind::Overflow => "overflow",
            ConversionErrorKind::Fractional => "fractional part lost",
            ConversionErrorKind::Inexact => "inexact value",
            ConversionErrorKind::OutOfDomain => "value out of domain",
            ConversionErrorKind::DimensionMismatch => "dimension size mismatch",
            ConversionErrorKind::AllocationFailed => "allocation failed",
            ConversionErrorKind::UnsetKernel => "kernel function not set",
            ConversionErrorKind::NullPointer => "null pointer",
        }
    }
}

impl fmt::Display for ConversionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data-level error raised while a kernel runs.
///
/// Elements written before the failing one stay written.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConversionError {
    pub kind: ConversionErrorKind,
    pub message: String,
}

impl ConversionError {
    #[cold]
    pub fn new(kind: ConversionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
