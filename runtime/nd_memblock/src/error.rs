use crate::MemoryBlockKind;

/// Failure to produce or use a memory block.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory allocating {size} bytes (alignment {align})")]
    OutOfMemory { size: usize, align: usize },

    #[error("invalid memory layout: {size} bytes with alignment {align}")]
    InvalidLayout { size: usize, align: usize },

    #[error("operation requires a {expected} memory block, found {actual}")]
    WrongKind {
        expected: MemoryBlockKind,
        actual: MemoryBlockKind,
    },

    #[error("array memory block is already initialized")]
    AlreadyBound,
}
