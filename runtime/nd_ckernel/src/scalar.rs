//! Per-scalar conversion rules.
//!
//! Every builtin reads into a widened [`ScalarValue`] and every builtin knows
//! how to build itself from one under an error mode. A (dst, src, mode)
//! conversion is the composition of the two, so each table entry is a
//! monomorphized pairing rather than hand-written code.
//!
//! | mode         | ints             | float -> int              | floats           |
//! |--------------|------------------|---------------------------|------------------|
//! | `none`       | wrap             | saturate, NaN -> 0        | round            |
//! | `overflow`   | range check      | range check (NaN fails)   | finite overflow  |
//! | `fractional` | range check      | also reject fractions     | finite overflow  |
//! | `inexact`    | range check      | also reject fractions     | reject rounding  |
//!
//! Discarding a non-zero imaginary part counts as overflow in every checked mode.

use std::fmt;

use crate::builtin::Complex;
use crate::{AssignErrorMode, BuiltinType, ConversionError, ConversionErrorKind};

/// Widened intermediate every builtin converts through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i128),
    Float(f64),
    Complex(f64, f64),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Complex(re, im) => write!(f, "({re}{im:+}j)"),
        }
    }
}

/// A Rust type with the exact layout of a builtin scalar.
pub trait BuiltinScalar: Copy + 'static {
    const TYPE: BuiltinType;

    /// # Safety
    ///
    /// `src` must be valid for reading `TYPE.data_size()` bytes.
    unsafe fn load(src: *const u8) -> Self;

    /// # Safety
    ///
    /// `dst` must be valid for writing `TYPE.data_size()` bytes.
    unsafe fn store(self, dst: *mut u8);

    fn to_value(self) -> ScalarValue;

    fn from_value(value: ScalarValue, mode: AssignErrorMode) -> Result<Self, ConversionErrorKind>;
}

impl BuiltinScalar for bool {
    const TYPE: BuiltinType = BuiltinType::Bool;

    #[inline]
    unsafe fn load(src: *const u8) -> Self {
        src.read() != 0
    }

    #[inline]
    unsafe fn store(self, dst: *mut u8) {
        dst.write(u8::from(self));
    }

    fn to_value(self) -> ScalarValue {
        ScalarValue::Bool(self)
    }

    fn from_value(value: ScalarValue, mode: AssignErrorMode) -> Result<Self, ConversionErrorKind> {
        let from_real = |x: f64| {
            if x == 0.0 {
                Ok(false)
            } else if x == 1.0 || !mode.checks_overflow() {
                Ok(true)
            } else {
                Err(ConversionErrorKind::Overflow)
            }
        };
        match value {
            ScalarValue::Bool(b) => Ok(b),
            ScalarValue::Int(0) => Ok(false),
            ScalarValue::Int(1) => Ok(true),
            ScalarValue::Int(_) if mode.checks_overflow() => Err(ConversionErrorKind::Overflow),
            ScalarValue::Int(_) => Ok(true),
            ScalarValue::Float(x) => from_real(x),
            ScalarValue::Complex(re, im) => {
                if im != 0.0 {
                    if mode.checks_overflow() {
                        return Err(ConversionErrorKind::Overflow);
                    }
                    return Ok(true);
                }
                from_real(re)
            }
        }
    }
}

macro_rules! int_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl BuiltinScalar for $t {
            const TYPE: BuiltinType = BuiltinType::$variant;

            #[inline]
            unsafe fn load(src: *const u8) -> Self {
                src.cast::<Self>().read_unaligned()
            }

            #[inline]
            unsafe fn store(self, dst: *mut u8) {
                dst.cast::<Self>().write_unaligned(self);
            }

            fn to_value(self) -> ScalarValue {
                ScalarValue::Int(i128::from(self))
            }

            fn from_value(value: ScalarValue, mode: AssignErrorMode) -> Result<Self, ConversionErrorKind> {
                let from_real = |x: f64| {
                    if !mode.checks_overflow() {
                        return Ok(x as Self);
                    }
                    let whole = x.trunc();
                    // `MAX as f64 + 1.0` is exactly the exclusive bound for every width.
                    let upper = Self::MAX as f64 + 1.0;
                    if !(whole >= Self::MIN as f64 && whole < upper) {
                        return Err(ConversionErrorKind::Overflow);
                    }
                    if mode.checks_fractional() && whole != x {
                        return Err(ConversionErrorKind::Fractional);
                    }
                    Ok(whole as Self)
                };
                match value {
                    ScalarValue::Bool(b) => Ok(Self::from(b)),
                    ScalarValue::Int(v) if mode.checks_overflow() => {
                        Self::try_from(v).map_err(|_| ConversionErrorKind::Overflow)
                    }
                    ScalarValue::Int(v) => Ok(v as Self),
                    ScalarValue::Float(x) => from_real(x),
                    ScalarValue::Complex(re, im) => {
                        if mode.checks_overflow() && im != 0.0 {
                            return Err(ConversionErrorKind::Overflow);
                        }
                        from_real(re)
                    }
                }
            }
        }
    )*};
}

int_scalar! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

macro_rules! float_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl BuiltinScalar for $t {
            const TYPE: BuiltinType = BuiltinType::$variant;

            #[inline]
            unsafe fn load(src: *const u8) -> Self {
                src.cast::<Self>().read_unaligned()
            }

            #[inline]
            unsafe fn store(self, dst: *mut u8) {
                dst.cast::<Self>().write_unaligned(self);
            }

            fn to_value(self) -> ScalarValue {
                ScalarValue::Float(f64::from(self))
            }

            fn from_value(value: ScalarValue, mode: AssignErrorMode) -> Result<Self, ConversionErrorKind> {
                let from_real = |x: f64| {
                    let narrowed = x as Self;
                    if mode.checks_overflow() && x.is_finite() && narrowed.is_infinite() {
                        return Err(ConversionErrorKind::Overflow);
                    }
                    if mode.checks_inexact() && !x.is_nan() && f64::from(narrowed) != x {
                        return Err(ConversionErrorKind::Inexact);
                    }
                    Ok(narrowed)
                };
                match value {
                    ScalarValue::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
                    ScalarValue::Int(v) => {
                        let converted = v as Self;
                        if mode.checks_inexact() && converted as i128 != v {
                            return Err(ConversionErrorKind::Inexact);
                        }
                        Ok(converted)
                    }
                    ScalarValue::Float(x) => from_real(x),
                    ScalarValue::Complex(re, im) => {
                        if mode.checks_overflow() && im != 0.0 {
                            return Err(ConversionErrorKind::Overflow);
                        }
                        from_real(re)
                    }
                }
            }
        }
    )*};
}

float_scalar! {
    f32 => Float32,
    f64 => Float64,
}

macro_rules! complex_scalar {
    ($($c:ty => $variant:ident),* $(,)?) => {$(
        impl BuiltinScalar for Complex<$c> {
            const TYPE: BuiltinType = BuiltinType::$variant;

            #[inline]
            unsafe fn load(src: *const u8) -> Self {
                src.cast::<Self>().read_unaligned()
            }

            #[inline]
            unsafe fn store(self, dst: *mut u8) {
                dst.cast::<Self>().write_unaligned(self);
            }

            fn to_value(self) -> ScalarValue {
                ScalarValue::Complex(f64::from(self.re), f64::from(self.im))
            }

            fn from_value(value: ScalarValue, mode: AssignErrorMode) -> Result<Self, ConversionErrorKind> {
                match value {
                    ScalarValue::Complex(re, im) => Ok(Complex::new(
                        <$c>::from_value(ScalarValue::Float(re), mode)?,
                        <$c>::from_value(ScalarValue::Float(im), mode)?,
                    )),
                    real => Ok(Complex::new(<$c>::from_value(real, mode)?, 0.0)),
                }
            }
        }
    )*};
}

complex_scalar! {
    f32 => Complex64,
    f64 => Complex128,
}

/// Convert the element at `src` into the element at `dst`.
///
/// # Safety
///
/// `src` and `dst` must be valid for the sizes of `S` and `D`.
#[inline]
pub(crate) unsafe fn convert_raw<D: BuiltinScalar, S: BuiltinScalar>(
    dst: *mut u8,
    src: *const u8,
    mode: AssignErrorMode,
) -> Result<(), ConversionError> {
    let value = S::load(src).to_value();
    match D::from_value(value, mode) {
        Ok(converted) => {
            converted.store(dst);
            Ok(())
        }
        Err(kind) => Err(conversion_failure(kind, D::TYPE, S::TYPE, value, mode)),
    }
}

#[cold]
fn conversion_failure(
    kind: ConversionErrorKind,
    dst: BuiltinType,
    src: BuiltinType,
    value: ScalarValue,
    mode: AssignErrorMode,
) -> ConversionError {
    ConversionError::new(
        kind,
        format!("cannot assign {src} value {value} to {dst} with error mode {mode}"),
    )
}

/// Convert one Rust value with the same rules the dispatch tables use.
pub fn assign_scalar<D: BuiltinScalar, S: BuiltinScalar>(
    src: S,
    mode: AssignErrorMode,
) -> Result<D, ConversionError> {
    let mode = mode.resolve(crate::DEFAULT_ERROR_MODE);
    let value = src.to_value();
    D::from_value(value, mode).map_err(|kind| conversion_failure(kind, D::TYPE, S::TYPE, value, mode))
}

#[cfg(test)]
mod tests;
