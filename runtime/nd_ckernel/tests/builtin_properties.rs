//! Property tests for the builtin conversion tables.

#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]
#![allow(unsafe_code, reason = "tests run kernels on raw element pointers")]

use nd_ckernel::{
    assign_scalar, builtin_single_fn, is_lossless_builtin_assignment, AssignErrorMode, BuiltinScalar,
    BuiltinType, Complex, ConversionErrorKind,
};
use proptest::prelude::*;

/// Run the table entry for `D <- S` on one value.
fn through_table<D: BuiltinScalar + Default, S: BuiltinScalar>(
    src: S,
    mode: AssignErrorMode,
) -> Result<D, ConversionErrorKind> {
    let mut out = D::default();
    let f = builtin_single_fn(D::TYPE, S::TYPE, mode);
    unsafe { f(std::ptr::from_mut(&mut out).cast(), std::ptr::from_ref(&src).cast(), std::ptr::null_mut()) }
        .map_err(|e| e.kind)?;
    Ok(out)
}

fn checked_mode() -> impl Strategy<Value = AssignErrorMode> {
    prop_oneof![
        Just(AssignErrorMode::Overflow),
        Just(AssignErrorMode::Fractional),
        Just(AssignErrorMode::Inexact),
    ]
}

proptest! {
    #[test]
    fn none_mode_matches_as_casts(v in any::<i64>()) {
        prop_assert_eq!(through_table::<u8, i64>(v, AssignErrorMode::None), Ok(v as u8));
        prop_assert_eq!(through_table::<i16, i64>(v, AssignErrorMode::None), Ok(v as i16));
        prop_assert_eq!(through_table::<u32, i64>(v, AssignErrorMode::None), Ok(v as u32));
    }

    #[test]
    fn float_to_int_none_mode_saturates_like_as(x in any::<f64>()) {
        prop_assert_eq!(through_table::<i32, f64>(x, AssignErrorMode::None), Ok(x as i32));
        prop_assert_eq!(through_table::<u64, f64>(x, AssignErrorMode::None), Ok(x as u64));
    }

    #[test]
    fn lossless_round_trip_is_bit_identical(v in any::<i32>(), mode in checked_mode()) {
        prop_assert!(is_lossless_builtin_assignment(BuiltinType::Float64, BuiltinType::Int32));
        let wide: f64 = through_table(v, mode).unwrap();
        let back: i32 = through_table(wide, mode).unwrap();
        prop_assert_eq!(back, v);

        let z: Complex<f64> = through_table(v, mode).unwrap();
        let back: i32 = through_table(z, mode).unwrap();
        prop_assert_eq!(back, v);
    }

    #[test]
    fn narrowing_round_trip_fails_exactly_when_out_of_range(v in any::<i32>(), mode in checked_mode()) {
        let narrowed = through_table::<u8, i32>(v, mode);
        if (0..=255).contains(&v) {
            let back: i32 = through_table(narrowed.unwrap(), mode).unwrap();
            prop_assert_eq!(back, v);
        } else {
            prop_assert_eq!(narrowed, Err(ConversionErrorKind::Overflow));
        }
    }

    #[test]
    fn table_agrees_with_scalar_helper(x in any::<f32>(), mode in checked_mode()) {
        let table = through_table::<i16, f32>(x, mode);
        let helper = assign_scalar::<i16, f32>(x, mode).map_err(|e| e.kind);
        prop_assert_eq!(table, helper);
    }
}
