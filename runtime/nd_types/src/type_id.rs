use std::fmt;

use nd_ckernel::BuiltinType;

/// Identity of a type family. Parameters (element types, sizes) are not part
/// of the id; [`crate::ExtendedType::equals`] compares those.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeId {
    Builtin(BuiltinType),
    StridedDim,
    FixedDim,
    VarDim,
    String,
    Categorical,
    Pointer,
    VoidPointer,
    Struct,
    Convert,
    GroupBy,
    /// A type family defined outside this crate.
    Custom(u32),
}

/// Coarse classification used for dispatch and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bool,
    Int,
    UInt,
    Real,
    Complex,
    Dim,
    String,
    Categorical,
    Pointer,
    Struct,
    Expression,
    Custom,
}

impl TypeKind {
    pub const fn of_builtin(tp: BuiltinType) -> Self {
        if matches!(tp, BuiltinType::Bool) {
            TypeKind::Bool
        } else if tp.is_signed_int() {
            TypeKind::Int
        } else if tp.is_unsigned_int() {
            TypeKind::UInt
        } else if tp.is_float() {
            TypeKind::Real
        } else {
            TypeKind::Complex
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::UInt => "uint",
            TypeKind::Real => "real",
            TypeKind::Complex => "complex",
            TypeKind::Dim => "dim",
            TypeKind::String => "string",
            TypeKind::Categorical => "categorical",
            TypeKind::Pointer => "pointer",
            TypeKind::Struct => "struct",
            TypeKind::Expression => "expression",
            TypeKind::Custom => "custom",
        };
        f.write_str(name)
    }
}
