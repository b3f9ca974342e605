#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use pretty_assertions::assert_eq;

use super::*;

use AssignErrorMode::{Fractional, Inexact, None, Overflow};

fn kind_of<D: BuiltinScalar, S: BuiltinScalar>(src: S, mode: AssignErrorMode) -> Option<ConversionErrorKind> {
    assign_scalar::<D, S>(src, mode).err().map(|e| e.kind)
}

#[test]
fn none_mode_wraps_integers() {
    assert_eq!(assign_scalar::<u8, i32>(300, None).unwrap(), 44);
    assert_eq!(assign_scalar::<u8, i32>(-1, None).unwrap(), 255);
    assert_eq!(assign_scalar::<i8, u64>(200, None).unwrap(), -56);
}

#[test]
fn checked_modes_reject_out_of_range_integers() {
    for mode in [Overflow, Fractional, Inexact] {
        assert_eq!(kind_of::<u8, i32>(300, mode), Some(ConversionErrorKind::Overflow));
        assert_eq!(kind_of::<u8, i32>(-1, mode), Some(ConversionErrorKind::Overflow));
        assert_eq!(kind_of::<u64, i64>(-5, mode), Some(ConversionErrorKind::Overflow));
    }
    assert_eq!(assign_scalar::<u8, i32>(255, Inexact).unwrap(), 255);
}

#[test]
fn float_to_int_checks_fraction_by_mode() {
    assert_eq!(assign_scalar::<i32, f64>(2.5, None).unwrap(), 2);
    assert_eq!(assign_scalar::<i32, f64>(2.5, Overflow).unwrap(), 2);
    assert_eq!(kind_of::<i32, f64>(2.5, Fractional), Some(ConversionErrorKind::Fractional));
    assert_eq!(kind_of::<i32, f64>(2.5, Inexact), Some(ConversionErrorKind::Fractional));
    assert_eq!(assign_scalar::<i32, f64>(-7.0, Inexact).unwrap(), -7);
}

#[test]
fn float_to_int_range_bounds_are_exact() {
    assert_eq!(assign_scalar::<u8, f64>(255.9, Overflow).unwrap(), 255);
    assert_eq!(kind_of::<u8, f64>(256.0, Overflow), Some(ConversionErrorKind::Overflow));
    assert_eq!(assign_scalar::<u8, f64>(-0.5, Overflow).unwrap(), 0);
    assert_eq!(kind_of::<i64, f64>(9.223_372_036_854_775_808e18, Overflow), Some(ConversionErrorKind::Overflow));
    assert_eq!(assign_scalar::<i64, f64>(-9.223_372_036_854_775_808e18, Overflow).unwrap(), i64::MIN);
    assert_eq!(kind_of::<i32, f64>(f64::NAN, Overflow), Some(ConversionErrorKind::Overflow));
    assert_eq!(assign_scalar::<i32, f64>(f64::NAN, None).unwrap(), 0);
    assert_eq!(assign_scalar::<u8, f64>(1e10, None).unwrap(), 255);
}

#[test]
fn int_to_float_is_inexact_only_when_rounded() {
    let big = (1i64 << 53) + 1;
    assert_eq!(kind_of::<f64, i64>(big, Inexact), Some(ConversionErrorKind::Inexact));
    assert_eq!(assign_scalar::<f64, i64>(big, Fractional).unwrap(), 9_007_199_254_740_992.0);
    assert_eq!(assign_scalar::<f64, i64>(1 << 53, Inexact).unwrap(), 9_007_199_254_740_992.0);
    assert_eq!(kind_of::<f32, u64>(u64::MAX, Inexact), Some(ConversionErrorKind::Inexact));
}

#[test]
fn double_to_single_checks_overflow_and_precision() {
    assert_eq!(kind_of::<f32, f64>(1e300, Overflow), Some(ConversionErrorKind::Overflow));
    assert!(assign_scalar::<f32, f64>(1e300, None).unwrap().is_infinite());
    assert!(assign_scalar::<f32, f64>(f64::INFINITY, Inexact).unwrap().is_infinite());
    assert!(assign_scalar::<f32, f64>(f64::NAN, Inexact).unwrap().is_nan());
    assert_eq!(kind_of::<f32, f64>(0.1, Inexact), Some(ConversionErrorKind::Inexact));
    assert_eq!(assign_scalar::<f32, f64>(0.5, Inexact).unwrap(), 0.5);
    assert_eq!(assign_scalar::<f32, f64>(0.1, Fractional).unwrap(), 0.1f32);
}

#[test]
fn bool_destination_requires_zero_or_one_when_checked() {
    assert!(assign_scalar::<bool, i32>(1, Overflow).unwrap());
    assert!(!assign_scalar::<bool, f64>(0.0, Inexact).unwrap());
    assert_eq!(kind_of::<bool, i32>(2, Overflow), Some(ConversionErrorKind::Overflow));
    assert!(assign_scalar::<bool, i32>(2, None).unwrap());
    assert_eq!(assign_scalar::<i16, bool>(true, Inexact).unwrap(), 1);
    assert_eq!(assign_scalar::<f64, bool>(true, Inexact).unwrap(), 1.0);
}

#[test]
fn complex_to_real_rejects_imaginary_part() {
    let z = Complex::new(3.0f64, 4.0);
    assert_eq!(kind_of::<f64, Complex<f64>>(z, Overflow), Some(ConversionErrorKind::Overflow));
    assert_eq!(assign_scalar::<f64, Complex<f64>>(z, None).unwrap(), 3.0);
    assert_eq!(assign_scalar::<i8, Complex<f32>>(Complex::new(-2.0, 0.0), Inexact).unwrap(), -2);
}

#[test]
fn real_to_complex_fills_zero_imaginary() {
    assert_eq!(
        assign_scalar::<Complex<f32>, i32>(7, Inexact).unwrap(),
        Complex::new(7.0, 0.0)
    );
    assert_eq!(
        assign_scalar::<Complex<f64>, Complex<f32>>(Complex::new(1.5, -2.5), Inexact).unwrap(),
        Complex::new(1.5, -2.5)
    );
    assert_eq!(
        kind_of::<Complex<f32>, Complex<f64>>(Complex::new(0.1, 0.0), Inexact),
        Some(ConversionErrorKind::Inexact)
    );
}

#[test]
fn default_mode_resolves_to_fractional() {
    assert_eq!(kind_of::<i32, f64>(0.5, AssignErrorMode::Default), Some(ConversionErrorKind::Fractional));
}

#[test]
fn error_message_names_types_and_value() {
    let err = assign_scalar::<u8, i32>(-1, Fractional).unwrap_err();
    assert_eq!(
        err.to_string(),
        "overflow: cannot assign int32 value -1 to uint8 with error mode fractional"
    );
}
