#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use nd_ckernel::BuiltinScalar;
use pretty_assertions::assert_eq;

use super::*;
use crate::types::make_string;
use crate::NdArray;

fn ectx() -> EvalContext {
    EvalContext::default()
}

fn elements<T: BuiltinScalar>(array: &NdArray) -> Vec<T> {
    // SAFETY: the array is a single `var * T` element.
    let data = unsafe { *array.data_ptr().cast::<VarDimData>() };
    (0..data.size)
        .map(|i| unsafe { T::load(data.begin.add(i * size_of::<T>())) })
        .collect()
}

fn var_of<T: BuiltinScalar>() -> NdArray {
    let tp = make_var_dim(&NdType::of::<T>()).unwrap();
    NdArray::empty(&tp, &[]).unwrap()
}

#[test]
fn unallocated_destination_takes_the_source_size() {
    let mut var = var_of::<i32>();
    var.assign_from(&NdArray::from_slice(&[1i16, 2, 3]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    assert_eq!(elements::<i32>(&var), vec![1, 2, 3]);

    let meta = unsafe { &*var.metadata_ptr().cast::<VarDimMeta>() };
    assert_eq!(meta.blockref.as_ref().unwrap().pod_bytes_in_use(), 12);
}

#[test]
fn allocated_destination_keeps_its_size() {
    let mut var = var_of::<i32>();
    var.assign_from(&NdArray::from_slice(&[1i32, 2, 3]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();

    var.assign_from(&NdArray::from_slice(&[9i32]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    assert_eq!(elements::<i32>(&var), vec![9, 9, 9]);

    var.assign_from(&NdArray::scalar(4i32).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    assert_eq!(elements::<i32>(&var), vec![4, 4, 4]);

    let err = var
        .assign_from(&NdArray::from_slice(&[1i32, 2]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap_err();
    assert!(
        matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::DimensionMismatch),
        "{err}"
    );
}

#[test]
fn var_sources_fill_static_destinations() {
    let mut var = var_of::<i64>();
    var.assign_from(&NdArray::from_slice(&[5i64, 6, 7]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();

    let mut dense = NdArray::from_slice(&[0f64; 3]).unwrap();
    dense.assign_from(&var, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(dense.to_vec::<f64>().unwrap(), vec![5.0, 6.0, 7.0]);

    let mut short = NdArray::from_slice(&[0i64; 2]).unwrap();
    let err = short.assign_from(&var, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::DimensionMismatch));
}

#[test]
fn var_to_var_copies_elements() {
    let mut first = var_of::<u8>();
    first
        .assign_from(&NdArray::from_slice(&[1u8, 2, 3, 4]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    let mut second = var_of::<u16>();
    second.assign_from(&first, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(elements::<u16>(&second), vec![1, 2, 3, 4]);
}

#[test]
fn strings_land_in_the_element_pool() {
    let tp = make_var_dim(&make_string()).unwrap();
    let mut var = NdArray::empty(&tp, &[]).unwrap();
    var.assign_from(&NdArray::from_strs(&["ab", "cde"]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    let data = unsafe { *var.data_ptr().cast::<VarDimData>() };
    assert_eq!(data.size, 2);
    let second = unsafe { crate::types::string_bytes(data.begin.add(16)) };
    assert_eq!(second, b"cde");
}

#[test]
fn offset_destinations_are_rejected() {
    let mut var = var_of::<i32>();
    // SAFETY: the array's metadata is a constructed var header.
    unsafe { (*var.metadata_ptr().cast::<VarDimMeta>()).offset = 8 };
    let err = var
        .assign_from(&NdArray::from_slice(&[1i32]).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap_err();
    assert!(matches!(err, NdError::InvalidDestinationLayout(_)), "{err}");
}

#[test]
fn higher_rank_sources_do_not_fit() {
    let mut var = var_of::<i32>();
    let src = NdArray::empty(
        &crate::types::make_strided_dim_n(2, &NdType::of::<i32>()),
        &[2, 2],
    )
    .unwrap();
    let err = var.assign_from(&src, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(matches!(err, NdError::Broadcast { .. }), "{err}");
}

#[test]
fn unsized_elements_are_rejected() {
    let err = make_var_dim(&crate::types::make_strided_dim(&NdType::of::<i32>())).unwrap_err();
    assert!(matches!(err, NdError::TypeConstruction(_)));
}
