use crate::KernelError;

/// Execution shape a kernel is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KernelRequest {
    /// One element per call.
    Single = 0,
    /// A run of `count` elements at fixed strides per call.
    Strided = 1,
}

impl TryFrom<u32> for KernelRequest {
    type Error = KernelError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(KernelRequest::Single),
            1 => Ok(KernelRequest::Strided),
            other => Err(KernelError::UnsupportedKernelRequest(other)),
        }
    }
}
