#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use pretty_assertions::assert_eq;

use super::*;
use crate::types::{make_strided_dim, StringMeta};
use crate::{AssignmentKernel, BufferedKernel, MetaRef, NdArray};

fn ectx() -> EvalContext {
    EvalContext::default()
}

fn indices(array: &NdArray, count: usize) -> Vec<u8> {
    // SAFETY: u8-indexed categorical elements laid out contiguously.
    unsafe { std::slice::from_raw_parts(array.data_ptr(), count) }.to_vec()
}

#[test]
fn strings_round_trip_through_indices() {
    let cat = make_string_categorical(&["low", "mid", "high"]).unwrap();
    let src = NdArray::from_strs(&["mid", "low", "high", "mid"]).unwrap();
    let mut coded = NdArray::empty(&make_strided_dim(&cat), &[4]).unwrap();
    coded.assign_from(&src, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(indices(&coded, 4), vec![1, 0, 2, 1]);

    let mut decoded = NdArray::empty(&make_strided_dim(&make_string()), &[4]).unwrap();
    decoded.assign_from(&coded, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(decoded.to_strings().unwrap(), vec!["mid", "low", "high", "mid"]);
}

#[test]
fn unknown_values_are_out_of_domain() {
    let cat = make_string_categorical(&["low", "mid", "high"]).unwrap();
    let src = NdArray::from_strs(&["mid", "huge"]).unwrap();
    let mut coded = NdArray::empty(&make_strided_dim(&cat), &[2]).unwrap();
    let err = coded.assign_from(&src, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(
        matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::OutOfDomain),
        "{err}"
    );
}

#[test]
fn stored_index_past_the_table_is_rejected() {
    let cat = make_string_categorical(&["a", "b"]).unwrap();
    let coded = NdArray::empty(&make_strided_dim(&cat), &[1]).unwrap();
    // SAFETY: one u8 element.
    unsafe { coded.data_ptr().write(5) };
    let mut decoded = NdArray::empty(&make_strided_dim(&make_string()), &[1]).unwrap();
    let err = decoded.assign_from(&coded, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::OutOfDomain));
}

#[test]
fn invalid_category_sets_are_rejected() {
    let cases: Vec<Result<NdType, NdError>> = vec![
        make_string_categorical(&[]),
        make_string_categorical(&["a", "b", "a"]),
        make_categorical(&make_strided_dim(&NdType::of::<i32>()), &[&[0u8, 0, 0, 0][..]]),
        make_categorical(&NdType::of::<i32>(), &[&[1u8, 2][..]]),
        make_categorical(&make_string(), &[&[0xffu8, 0xfe][..]]),
    ];
    for case in cases {
        assert!(matches!(case, Err(NdError::TypeConstruction(_))), "{case:?}");
    }
}

#[test]
fn storage_width_follows_the_category_count() {
    let names: Vec<String> = (0..300).map(|i| format!("c{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let narrow = make_string_categorical(&refs[..256]).unwrap();
    let narrow = narrow.downcast::<CategoricalType>().unwrap();
    assert_eq!(narrow.storage_type(), BuiltinType::UInt8);

    let wide = make_string_categorical(&refs).unwrap();
    assert_eq!(wide.data_size(), 2);
    let wide = wide.downcast::<CategoricalType>().unwrap();
    assert_eq!(wide.storage_type(), BuiltinType::UInt16);
    assert_eq!(wide.index_of(b"c299"), Some(299));
    assert_eq!(wide.category_bytes(7), Some(&b"c7"[..]));
}

#[test]
fn builtin_categories_convert_both_ways() {
    let cat = make_categorical_of(&[10i32, 20, 30]).unwrap();
    let mut coded = NdArray::empty(&make_strided_dim(&cat), &[3]).unwrap();
    // i64 sources are buffered through the int32 category type.
    coded
        .assign_from(&NdArray::from_slice(&[30i64, 10, 20]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    assert_eq!(indices(&coded, 3), vec![2, 0, 1]);

    let mut widened = NdArray::from_slice(&[0f64; 3]).unwrap();
    widened.assign_from(&coded, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(widened.to_vec::<f64>().unwrap(), vec![30.0, 10.0, 20.0]);
}

#[test]
fn display_lists_string_categories() {
    let cat = make_string_categorical(&["a", "b"]).unwrap();
    assert_eq!(cat.to_string(), r#"categorical[string, ["a", "b"]]"#);
    let ints = make_categorical_of(&[1i32, 2, 3]).unwrap();
    assert_eq!(ints.to_string(), "categorical[int32, 3 categories]");
}

#[test]
fn recoding_between_categoricals_releases_buffered_strings() {
    let from = make_string_categorical(&["x", "y", "z"]).unwrap();
    let to = make_string_categorical(&["z", "y", "x", "w"]).unwrap();
    let mut kernel = AssignmentKernel::new(
        &to,
        MetaRef::NONE,
        &from,
        MetaRef::NONE,
        KernelRequest::Strided,
        AssignErrorMode::Default,
        &ectx(),
    )
    .unwrap();

    let src: Vec<u8> = (0..200u8).map(|i| i % 3).collect();
    let mut dst = vec![0u8; 200];
    unsafe { kernel.strided(dst.as_mut_ptr(), 1, src.as_ptr(), 1, 200) }.unwrap();
    let expected: Vec<u8> = src.iter().map(|&i| 2 - i).collect();
    assert_eq!(dst, expected);

    let buffered = unsafe { kernel.builder().get_at::<BufferedKernel>(0) }.unwrap();
    assert_eq!(buffered.buffer_type(), &make_string());
    // SAFETY: the buffer metadata is constructed string metadata.
    let meta = unsafe { &*buffered.buffer_metadata().as_ptr().cast::<StringMeta>() };
    let pool = meta.blockref.as_ref().unwrap();
    assert_eq!(pool.pod_bytes_in_use(), 0);
}
