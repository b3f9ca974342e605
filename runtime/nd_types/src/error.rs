use nd_ckernel::{ConversionError, KernelError};
use nd_memblock::AllocError;

use crate::NdType;

/// Errors from type construction, kernel compilation and array setup.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NdError {
    #[error("invalid type: {0}")]
    TypeConstruction(String),

    #[error("cannot assign from {src} to {dst}")]
    IncompatibleTypes { dst: String, src: String },

    #[error("invalid destination layout: {0}")]
    InvalidDestinationLayout(String),

    #[error("unsupported kernel request {0}")]
    UnsupportedKernelRequest(u32),

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("cannot broadcast {src} to {dst}")]
    Broadcast { dst: String, src: String },

    #[error(transparent)]
    Kernel(KernelError),

    #[error(transparent)]
    Memory(AllocError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl NdError {
    #[cold]
    pub fn incompatible(dst: &NdType, src: &NdType) -> Self {
        NdError::IncompatibleTypes {
            dst: dst.to_string(),
            src: src.to_string(),
        }
    }

    #[cold]
    pub fn broadcast(dst: &NdType, src: &NdType) -> Self {
        NdError::Broadcast {
            dst: dst.to_string(),
            src: src.to_string(),
        }
    }

    #[cold]
    pub fn construction(message: impl Into<String>) -> Self {
        NdError::TypeConstruction(message.into())
    }

    #[cold]
    pub fn layout(message: impl Into<String>) -> Self {
        NdError::InvalidDestinationLayout(message.into())
    }
}

impl From<KernelError> for NdError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::UnsupportedKernelRequest(code) => NdError::UnsupportedKernelRequest(code),
            KernelError::OutOfMemory { requested } => NdError::OutOfMemory { bytes: requested },
            other @ KernelError::InvalidOffset { .. } => NdError::Kernel(other),
        }
    }
}

impl From<AllocError> for NdError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::OutOfMemory { size, .. } => NdError::OutOfMemory { bytes: size },
            other => NdError::Memory(other),
        }
    }
}
