//! The type handle: a builtin id or a shared extended descriptor.

use std::fmt;
use std::sync::Arc;

use nd_ckernel::{BuiltinScalar, BuiltinType};
use nd_memblock::MemoryBlockRef;

use crate::{ExtendedType, NdError, TypeFlags, TypeId, TypeKind};

/// A type descriptor handle.
///
/// Builtin types are plain values. Extended types are reference counted:
/// cloning a handle retains the descriptor, dropping it releases, and the
/// descriptor is destroyed with its last handle.
#[derive(Clone)]
pub enum NdType {
    Builtin(BuiltinType),
    Extended(Arc<dyn ExtendedType>),
}

impl NdType {
    pub fn new(extended: impl ExtendedType + 'static) -> Self {
        NdType::Extended(Arc::new(extended))
    }

    pub fn of<T: BuiltinScalar>() -> Self {
        NdType::Builtin(T::TYPE)
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            NdType::Builtin(b) => TypeId::Builtin(*b),
            NdType::Extended(e) => e.type_id(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            NdType::Builtin(b) => TypeKind::of_builtin(*b),
            NdType::Extended(e) => e.kind(),
        }
    }

    pub fn data_size(&self) -> usize {
        match self {
            NdType::Builtin(b) => b.data_size(),
            NdType::Extended(e) => e.data_size(),
        }
    }

    pub fn default_data_size(&self, shape: &[usize]) -> Option<usize> {
        match self {
            NdType::Builtin(b) => Some(b.data_size()),
            NdType::Extended(e) => e.default_data_size(shape),
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            NdType::Builtin(b) => b.alignment(),
            NdType::Extended(e) => e.alignment(),
        }
    }

    pub fn metadata_size(&self) -> usize {
        match self {
            NdType::Builtin(_) => 0,
            NdType::Extended(e) => e.metadata_size(),
        }
    }

    pub fn flags(&self) -> TypeFlags {
        match self {
            NdType::Builtin(_) => TypeFlags::empty(),
            NdType::Extended(e) => e.flags(),
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            NdType::Builtin(_) => 0,
            NdType::Extended(e) => e.ndim(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, NdType::Builtin(_))
    }

    pub fn builtin(&self) -> Option<BuiltinType> {
        match self {
            NdType::Builtin(b) => Some(*b),
            NdType::Extended(_) => None,
        }
    }

    pub fn extended(&self) -> Option<&dyn ExtendedType> {
        match self {
            NdType::Builtin(_) => None,
            NdType::Extended(e) => Some(&**e),
        }
    }

    /// The concrete descriptor, when this is an extended type of type `T`.
    pub fn downcast<T: ExtendedType + 'static>(&self) -> Option<&T> {
        self.extended()?.as_any().downcast_ref::<T>()
    }

    pub fn is_expression(&self) -> bool {
        self.flags().contains(TypeFlags::EXPRESSION)
    }

    /// Fixed-size data that is copied by copying its bytes.
    pub fn is_plain_data(&self) -> bool {
        self.data_size() > 0 && self.flags().is_plain_data()
    }

    /// Logical type; `self` unless this is an expression type.
    pub fn value_type(&self) -> &NdType {
        match self {
            NdType::Extended(e) => e.value_type().unwrap_or(self),
            NdType::Builtin(_) => self,
        }
    }

    /// Stored representation one layer down; `self` unless this is an
    /// expression type.
    pub fn operand_type(&self) -> &NdType {
        match self {
            NdType::Extended(e) => e.operand_type().unwrap_or(self),
            NdType::Builtin(_) => self,
        }
    }

    /// Innermost stored representation, following operand types down.
    pub fn storage_type(&self) -> &NdType {
        let mut tp = self;
        while tp.is_expression() {
            let next = tp.operand_type();
            if NdType::ptr_eq(tp, next) {
                break;
            }
            tp = next;
        }
        tp
    }

    /// Same handle (builtins compare by id).
    pub fn ptr_eq(a: &NdType, b: &NdType) -> bool {
        match (a, b) {
            (NdType::Builtin(x), NdType::Builtin(y)) => x == y,
            (NdType::Extended(x), NdType::Extended(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Live handles to an extended descriptor; builtins report 1.
    pub fn handle_count(&self) -> usize {
        match self {
            NdType::Builtin(_) => 1,
            NdType::Extended(e) => Arc::strong_count(e),
        }
    }

    /// # Safety
    ///
    /// See [`ExtendedType::metadata_default_construct`].
    pub unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        match self {
            NdType::Builtin(_) => Ok(()),
            NdType::Extended(e) => e.metadata_default_construct(metadata, shape),
        }
    }

    /// # Safety
    ///
    /// See [`ExtendedType::metadata_copy_construct`].
    pub unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        if let NdType::Extended(e) = self {
            e.metadata_copy_construct(dst, src, embedded);
        }
    }

    /// # Safety
    ///
    /// See [`ExtendedType::metadata_reset_buffers`].
    pub unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        if let NdType::Extended(e) = self {
            e.metadata_reset_buffers(metadata);
        }
    }

    /// # Safety
    ///
    /// See [`ExtendedType::metadata_destruct`].
    pub unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        if let NdType::Extended(e) = self {
            e.metadata_destruct(metadata);
        }
    }
}

impl From<BuiltinType> for NdType {
    fn from(tp: BuiltinType) -> Self {
        NdType::Builtin(tp)
    }
}

impl PartialEq for NdType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NdType::Builtin(a), NdType::Builtin(b)) => a == b,
            (NdType::Extended(a), NdType::Extended(b)) => {
                Arc::ptr_eq(a, b) || (a.type_id() == b.type_id() && a.equals(&**b))
            }
            _ => false,
        }
    }
}

impl Eq for NdType {}

impl fmt::Display for NdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NdType::Builtin(b) => fmt::Display::fmt(b, f),
            NdType::Extended(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for NdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NdType({self})")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{make_convert, make_string, make_strided_dim};
    use nd_ckernel::AssignErrorMode;

    #[test]
    fn builtin_properties() {
        let tp = NdType::of::<i32>();
        assert_eq!(tp.type_id(), TypeId::Builtin(BuiltinType::Int32));
        assert_eq!(tp.kind(), TypeKind::Int);
        assert_eq!(tp.data_size(), 4);
        assert_eq!(tp.metadata_size(), 0);
        assert!(tp.is_plain_data());
        assert_eq!(tp.value_type(), &tp);
        assert_eq!(tp.to_string(), "int32");
    }

    #[test]
    fn structural_equality_across_handles() {
        let a = make_strided_dim(&NdType::of::<f64>());
        let b = make_strided_dim(&NdType::of::<f64>());
        assert!(!NdType::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_ne!(a, make_strided_dim(&NdType::of::<f32>()));
    }

    #[test]
    fn handles_share_one_descriptor() {
        let tp = make_string();
        let copies: Vec<NdType> = (0..5).map(|_| tp.clone()).collect();
        assert_eq!(tp.handle_count(), 6);
        drop(copies);
        assert_eq!(tp.handle_count(), 1);
    }

    #[test]
    fn storage_type_follows_operands() {
        let inner = make_convert(&NdType::of::<f32>(), &NdType::of::<i64>(), AssignErrorMode::Default).unwrap();
        let outer = make_convert(&NdType::of::<f64>(), &inner, AssignErrorMode::Default).unwrap();
        assert_eq!(outer.value_type(), &NdType::of::<f64>());
        assert_eq!(outer.operand_type(), &inner);
        assert_eq!(outer.storage_type(), &NdType::of::<i64>());
    }
}
