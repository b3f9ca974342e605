//! Builtin scalar kinds.
//!
//! Builtin types carry no heap descriptor: the kind alone fixes size,
//! alignment and conversion behavior. Raw type ids are contiguous from
//! [`FIRST_BUILTIN_ID`], so `id - FIRST_BUILTIN_ID` indexes the dispatch
//! tables directly.

use std::fmt;

/// Raw id of the first builtin scalar. Id 0 is reserved for "uninitialized".
pub const FIRST_BUILTIN_ID: u8 = 1;

/// Number of builtin scalar kinds.
pub const BUILTIN_COUNT: usize = 13;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[repr(u8)]
pub enum BuiltinType {
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    UInt8 = 6,
    UInt16 = 7,
    UInt32 = 8,
    UInt64 = 9,
    Float32 = 10,
    Float64 = 11,
    /// Pair of `f32`.
    Complex64 = 12,
    /// Pair of `f64`.
    Complex128 = 13,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; BUILTIN_COUNT] = [
        BuiltinType::Bool,
        BuiltinType::Int8,
        BuiltinType::Int16,
        BuiltinType::Int32,
        BuiltinType::Int64,
        BuiltinType::UInt8,
        BuiltinType::UInt16,
        BuiltinType::UInt32,
        BuiltinType::UInt64,
        BuiltinType::Float32,
        BuiltinType::Float64,
        BuiltinType::Complex64,
        BuiltinType::Complex128,
    ];

    #[must_use]
    pub const fn from_type_id(id: u8) -> Option<Self> {
        if id < FIRST_BUILTIN_ID || id as usize >= FIRST_BUILTIN_ID as usize + BUILTIN_COUNT {
            return None;
        }
        Some(Self::ALL[(id - FIRST_BUILTIN_ID) as usize])
    }

    #[inline]
    pub const fn type_id(self) -> u8 {
        self as u8
    }

    /// Dispatch table index.
    #[inline]
    pub const fn index(self) -> usize {
        (self as u8 - FIRST_BUILTIN_ID) as usize
    }

    pub const fn data_size(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    pub const fn alignment(self) -> usize {
        match self {
            Self::Complex64 => 4,
            Self::Complex128 => 8,
            other => other.data_size(),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex[float32]",
            Self::Complex128 => "complex[float64]",
        }
    }

    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage layout of the complex builtins: real part then imaginary part.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}
