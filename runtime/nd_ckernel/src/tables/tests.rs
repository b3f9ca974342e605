#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use std::mem::size_of;

use pretty_assertions::assert_eq;

use super::*;
use crate::{is_lossless_builtin_assignment, ConversionErrorKind};

fn strided_i32_to_u8(values: &[i32], mode: AssignErrorMode) -> (Vec<u8>, Result<(), ConversionError>) {
    let mut ckb = KernelBuilder::new();
    let end = compile_builtin_assignment(
        &mut ckb,
        0,
        BuiltinType::UInt8,
        BuiltinType::Int32,
        KernelRequest::Strided,
        mode,
    )
    .unwrap();
    assert_eq!(end, size_of::<KernelPrefix>());

    let mut out = vec![0xAAu8; values.len()];
    let result = unsafe {
        ckb.call_strided(
            out.as_mut_ptr(),
            1,
            values.as_ptr().cast(),
            4,
            values.len(),
        )
    };
    (out, result)
}

#[test]
fn fractional_mode_stops_at_first_out_of_range_element() {
    let (out, result) = strided_i32_to_u8(&[10, -1, 300], AssignErrorMode::Fractional);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ConversionErrorKind::Overflow);
    assert_eq!(out, vec![10, 0xAA, 0xAA]);
}

#[test]
fn overflow_mode_rejects_300_and_none_mode_wraps_it() {
    let (out, result) = strided_i32_to_u8(&[7, 300], AssignErrorMode::Overflow);
    assert_eq!(result.unwrap_err().kind, ConversionErrorKind::Overflow);
    assert_eq!(out, vec![7, 0xAA]);

    let (out, result) = strided_i32_to_u8(&[7, 300, -1], AssignErrorMode::None);
    result.unwrap();
    assert_eq!(out, vec![7, 44, 255]);
}

#[test]
fn single_entry_converts_one_element() {
    let mut ckb = KernelBuilder::new();
    compile_builtin_assignment(
        &mut ckb,
        0,
        BuiltinType::Float32,
        BuiltinType::Int16,
        KernelRequest::Single,
        AssignErrorMode::Inexact,
    )
    .unwrap();
    let src = -1234i16;
    let mut dst = 0f32;
    unsafe {
        ckb.call_single(std::ptr::from_mut(&mut dst).cast(), std::ptr::from_ref(&src).cast())
            .unwrap();
    }
    assert_eq!(dst, -1234.0);
}

#[test]
fn single_request_leaves_strided_slot_empty() {
    let mut ckb = KernelBuilder::new();
    compile_builtin_assignment(
        &mut ckb,
        0,
        BuiltinType::Int64,
        BuiltinType::Int64,
        KernelRequest::Single,
        AssignErrorMode::None,
    )
    .unwrap();
    assert!(ckb.record_at(0).unwrap().has_single());
    assert!(!ckb.record_at(0).unwrap().has_strided());
}

#[test]
fn identity_entries_copy_values_in_every_mode() {
    let src: [u8; 16] = [1, 0, 0, 0, 0, 0, 0xF0, 0x3F, 0, 0, 0, 0, 0, 0, 0, 0x40];
    for tp in BuiltinType::ALL {
        for mode in [
            AssignErrorMode::None,
            AssignErrorMode::Overflow,
            AssignErrorMode::Fractional,
            AssignErrorMode::Inexact,
        ] {
            let mut dst = [0u8; 16];
            let f = builtin_single_fn(tp, tp, mode);
            unsafe { f(dst.as_mut_ptr(), src.as_ptr(), std::ptr::null_mut()) }.unwrap();
            let size = tp.data_size();
            assert_eq!(&dst[..size], &src[..size], "{tp} in mode {mode}");
        }
    }
}

#[test]
fn strided_entries_honor_negative_strides() {
    let src = [1.5f64, 2.5, 3.5];
    let mut dst = [0i32; 3];
    let f = builtin_strided_fn(BuiltinType::Int32, BuiltinType::Float64, AssignErrorMode::Overflow);
    unsafe {
        f(
            dst.as_mut_ptr().cast(),
            4,
            src.as_ptr().add(2).cast(),
            -8,
            3,
            std::ptr::null_mut(),
        )
    }
    .unwrap();
    assert_eq!(dst, [3, 2, 1]);
}

#[test]
fn lossless_analysis_matches_representable_ranges() {
    use BuiltinType as B;
    assert!(is_lossless_builtin_assignment(B::Int16, B::Int8));
    assert!(is_lossless_builtin_assignment(B::Int16, B::UInt8));
    assert!(!is_lossless_builtin_assignment(B::Int16, B::UInt16));
    assert!(!is_lossless_builtin_assignment(B::UInt32, B::Int8));
    assert!(is_lossless_builtin_assignment(B::Float64, B::Int32));
    assert!(!is_lossless_builtin_assignment(B::Float64, B::Int64));
    assert!(is_lossless_builtin_assignment(B::Float32, B::UInt16));
    assert!(!is_lossless_builtin_assignment(B::Float32, B::Int32));
    assert!(is_lossless_builtin_assignment(B::Complex128, B::Float32));
    assert!(is_lossless_builtin_assignment(B::Complex64, B::Float32));
    assert!(!is_lossless_builtin_assignment(B::Complex64, B::Float64));
    assert!(!is_lossless_builtin_assignment(B::Float64, B::Complex64));
    assert!(is_lossless_builtin_assignment(B::UInt8, B::Bool));
    assert!(!is_lossless_builtin_assignment(B::Bool, B::UInt8));
}

#[test]
fn lossless_pairs_never_fail_in_inexact_mode() {
    let samples: [[u8; 16]; 3] = [[0xFF; 16], [0x80; 16], [0x01; 16]];
    for dst in BuiltinType::ALL {
        for src in BuiltinType::ALL {
            if !is_lossless_builtin_assignment(dst, src) || src.is_float() || src.is_complex() {
                continue;
            }
            let f = builtin_single_fn(dst, src, AssignErrorMode::Inexact);
            for sample in &samples {
                let mut bytes = *sample;
                if src == BuiltinType::Bool {
                    bytes[0] &= 1;
                }
                let mut out = [0u8; 16];
                let result = unsafe { f(out.as_mut_ptr(), bytes.as_ptr(), std::ptr::null_mut()) };
                assert!(result.is_ok(), "{src} -> {dst}: {result:?}");
            }
        }
    }
}
