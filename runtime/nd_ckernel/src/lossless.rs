use crate::BuiltinType;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    Bool,
    Signed,
    Unsigned,
    Real,
    Complex,
}

fn classify(tp: BuiltinType) -> Class {
    if tp == BuiltinType::Bool {
        Class::Bool
    } else if tp.is_signed_int() {
        Class::Signed
    } else if tp.is_unsigned_int() {
        Class::Unsigned
    } else if tp.is_float() {
        Class::Real
    } else {
        Class::Complex
    }
}

/// Bytes per real component.
fn component_size(tp: BuiltinType) -> usize {
    if tp.is_complex() {
        tp.data_size() / 2
    } else {
        tp.data_size()
    }
}

/// Significand bits of a floating component of the given size.
fn significand_bits(component_size: usize) -> usize {
    if component_size == 4 {
        24
    } else {
        53
    }
}

/// Magnitude bits of an integer type.
fn magnitude_bits(tp: BuiltinType) -> usize {
    let bits = tp.data_size() * 8;
    if tp.is_signed_int() {
        bits - 1
    } else {
        bits
    }
}

/// Whether every value of `src` is exactly representable in `dst`.
///
/// Pure function of the two kinds; callers use it to relax an error mode to
/// `none`, never to tighten it.
pub fn is_lossless_builtin_assignment(dst: BuiltinType, src: BuiltinType) -> bool {
    if dst == src {
        return true;
    }
    let dst_size = component_size(dst);
    let src_size = component_size(src);
    match (classify(dst), classify(src)) {
        (_, Class::Bool) => true,
        (Class::Signed, Class::Signed) | (Class::Unsigned, Class::Unsigned) => dst_size >= src_size,
        (Class::Signed, Class::Unsigned) => dst_size > src_size,
        (Class::Real | Class::Complex, Class::Signed | Class::Unsigned) => {
            magnitude_bits(src) <= significand_bits(dst_size)
        }
        (Class::Real | Class::Complex, Class::Real) | (Class::Complex, Class::Complex) => {
            dst_size >= src_size
        }
        _ => false,
    }
}
