//! Layout properties every type descriptor reports.

use bitflags::bitflags;

bitflags! {
    /// What allocation sites and kernels must do for data of a type.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u32 {
        /// Fresh data must be zero-filled before use (e.g. null string pointers).
        const ZEROINIT = 1 << 0;
        /// Metadata holds memory block references that own part of the data.
        const BLOCKREF = 1 << 1;
        /// Data needs a destructor when released.
        const DESTRUCTOR = 1 << 2;
        /// Stored representation differs from the logical value.
        const EXPRESSION = 1 << 3;
    }
}

impl TypeFlags {
    /// Flags a composite inherits from the types it contains.
    pub const PROPAGATE_MASK: Self = Self::from_bits_truncate(
        Self::ZEROINIT.bits() | Self::BLOCKREF.bits() | Self::DESTRUCTOR.bits(),
    );

    #[inline]
    pub fn propagate_from(child: Self) -> Self {
        child & Self::PROPAGATE_MASK
    }

    pub fn propagate_all(children: impl IntoIterator<Item = Self>) -> Self {
        children
            .into_iter()
            .fold(Self::empty(), |acc, child| acc | Self::propagate_from(child))
    }

    /// Data is plain bytes: copying them copies the stored value.
    #[inline]
    pub fn is_plain_data(self) -> bool {
        !self.intersects(Self::BLOCKREF | Self::DESTRUCTOR)
    }
}
