#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use pretty_assertions::assert_eq;

use super::*;
use crate::types::{
    make_convert, make_string, make_string_categorical, make_strided_dim, string_bytes, write_string, StridedDimMeta,
    StringData,
};

fn ectx() -> EvalContext {
    EvalContext::default()
}

fn keys(categories: &[&str], values: &[&str]) -> NdArray {
    let cat = make_string_categorical(categories).unwrap();
    let mut by = NdArray::empty(&make_strided_dim(&cat), &[values.len()]).unwrap();
    by.assign_from(&NdArray::from_strs(values).unwrap(), AssignErrorMode::Default, &ectx())
        .unwrap();
    by
}

fn evaluate(grouped: &NdArray) -> Result<NdArray, NdError> {
    let value = grouped.get_type().value_type().clone();
    let mut out = NdArray::empty(&value, &[])?;
    out.assign_from(grouped, AssignErrorMode::Default, &ectx())?;
    Ok(out)
}

fn string_groups(groups: &NdArray, count: usize) -> Vec<Vec<String>> {
    (0..count)
        .map(|g| {
            // SAFETY: `count` contiguous var elements of strings.
            let data = unsafe { *groups.data_ptr().cast::<VarDimData>().add(g) };
            (0..data.size)
                .map(|i| {
                    let bytes = unsafe { string_bytes(data.begin.add(i * size_of::<StringData>())) };
                    String::from_utf8_lossy(bytes).into_owned()
                })
                .collect()
        })
        .collect()
}

#[test]
fn elements_are_grouped_in_input_order() {
    let data = NdArray::from_strs(&["a", "b", "c", "d", "e"]).unwrap();
    let by = keys(&["x", "y", "z"], &["x", "y", "x", "z", "y"]);
    let grouped = groupby(&data, &by).unwrap();
    assert!(grouped.get_type().is_expression());
    assert_eq!(grouped.get_type().value_type().to_string(), "3 * var * string");

    let groups = evaluate(&grouped).unwrap();
    assert_eq!(
        string_groups(&groups, 3),
        vec![vec!["a", "c"], vec!["b", "e"], vec!["d"]]
    );
}

/// Strings stored under `convert[to=categorical, from=string]` keys.
fn string_keys(categories: &[&str], values: &[&str]) -> NdArray {
    let cat = make_string_categorical(categories).unwrap();
    let key = make_convert(&cat, &make_string(), AssignErrorMode::Default).unwrap();
    let by = NdArray::empty(&make_strided_dim(&key), &[values.len()]).unwrap();
    let element_md = by.metadata_ptr().wrapping_add(size_of::<StridedDimMeta>());
    for (i, value) in values.iter().enumerate() {
        // SAFETY: the convert element stores strings with string metadata.
        unsafe {
            let data = by.data_ptr().add(i * size_of::<StringData>());
            write_string(element_md, data, value.as_bytes()).unwrap();
        }
    }
    by
}

#[test]
fn expression_keys_are_evaluated_to_categories() {
    let data = NdArray::from_slice(&[1i32, 2, 3, 4]).unwrap();
    let by = string_keys(&["x", "y"], &["y", "x", "y", "y"]);
    let grouped = groupby(&data, &by).unwrap();
    assert_eq!(grouped.get_type().value_type().to_string(), "2 * var * int32");

    let groups = evaluate(&grouped).unwrap();
    let read = |g: usize| {
        let data = unsafe { *groups.data_ptr().cast::<VarDimData>().add(g) };
        (0..data.size)
            .map(|i| unsafe { data.begin.cast::<i32>().add(i).read() })
            .collect::<Vec<_>>()
    };
    assert_eq!(read(0), vec![2]);
    assert_eq!(read(1), vec![1, 3, 4]);
}

#[test]
fn unknown_expression_key_is_out_of_domain() {
    let data = NdArray::from_slice(&[1i32, 2]).unwrap();
    let by = string_keys(&["x", "y"], &["x", "w"]);
    let err = evaluate(&groupby(&data, &by).unwrap()).unwrap_err();
    assert!(
        matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::OutOfDomain),
        "{err}"
    );
}

#[test]
fn empty_groups_stay_empty() {
    let data = NdArray::from_slice(&[1.5f64, 2.5]).unwrap();
    let by = keys(&["p", "q", "r"], &["r", "r"]);
    let groups = evaluate(&groupby(&data, &by).unwrap()).unwrap();
    let sizes: Vec<usize> = (0..3)
        .map(|g| unsafe { (*groups.data_ptr().cast::<VarDimData>().add(g)).size })
        .collect();
    assert_eq!(sizes, vec![0, 0, 2]);
    let last = unsafe { *groups.data_ptr().cast::<VarDimData>().add(2) };
    let values: Vec<f64> = (0..2).map(|i| unsafe { last.begin.cast::<f64>().add(i).read() }).collect();
    assert_eq!(values, vec![1.5, 2.5]);
}

#[test]
fn inputs_outlive_their_handles() {
    let grouped = {
        let data = NdArray::from_slice(&[10i32, 20, 30]).unwrap();
        let by = keys(&["odd", "even"], &["even", "odd", "even"]);
        groupby(&data, &by).unwrap()
    };
    let groups = evaluate(&grouped).unwrap();
    let read = |g: usize| {
        let data = unsafe { *groups.data_ptr().cast::<VarDimData>().add(g) };
        (0..data.size)
            .map(|i| unsafe { data.begin.cast::<i32>().add(i).read() })
            .collect::<Vec<_>>()
    };
    assert_eq!(read(0), vec![20]);
    assert_eq!(read(1), vec![10, 30]);
}

#[test]
fn keys_are_read_when_evaluated() {
    let data = NdArray::from_slice(&[1u8, 2]).unwrap();
    let by = keys(&["a", "b"], &["a", "b"]);
    let grouped = groupby(&data, &by).unwrap();
    // SAFETY: two u8 category indices.
    unsafe { by.data_ptr().add(1).write(9) };
    let err = evaluate(&grouped).unwrap_err();
    assert!(
        matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::OutOfDomain),
        "{err}"
    );
}

#[test]
fn mismatched_lengths_fail_to_compile() {
    let data = NdArray::from_slice(&[1i32, 2, 3]).unwrap();
    let by = keys(&["a", "b"], &["a", "b"]);
    let err = evaluate(&groupby(&data, &by).unwrap()).unwrap_err();
    assert!(matches!(err, NdError::Broadcast { .. }), "{err}");
}

#[test]
fn offset_destination_is_rejected() {
    let data = NdArray::from_slice(&[1i32, 2]).unwrap();
    let by = keys(&["a", "b"], &["a", "b"]);
    let grouped = groupby(&data, &by).unwrap();
    let mut out = NdArray::empty(grouped.get_type().value_type(), &[]).unwrap();
    // SAFETY: the fixed dimension shares the var header at offset 0.
    unsafe { (*out.metadata_ptr().cast::<VarDimMeta>()).offset = 4 };
    let err = out.assign_from(&grouped, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(matches!(err, NdError::InvalidDestinationLayout(_)), "{err}");
}

#[test]
fn construction_requires_dimensions_and_categorical_keys() {
    let strings = make_strided_dim(&make_string());
    let ints = make_strided_dim(&NdType::of::<i32>());
    let cat = make_strided_dim(&make_string_categorical(&["a"]).unwrap());

    for (data, by) in [
        (make_string(), cat.clone()),
        (strings.clone(), NdType::of::<i32>()),
        (strings.clone(), ints),
        (
            strings.clone(),
            make_strided_dim(&make_convert(&NdType::of::<i32>(), &make_string(), AssignErrorMode::Default).unwrap()),
        ),
    ] {
        let err = make_groupby(&data, &by).unwrap_err();
        assert!(matches!(err, NdError::TypeConstruction(_)), "{data} by {by}");
    }
    let ok = make_groupby(&strings, &cat).unwrap();
    assert_eq!(ok.ndim(), 2);
}

#[test]
fn equal_groupby_scatters_groups_by_destination_keys() {
    let src_data = NdArray::from_slice(&[10i32, 20, 30]).unwrap();
    let src_keys = keys(&["a", "b"], &["a", "b", "a"]);
    let src = groupby(&src_data, &src_keys).unwrap();

    let dst_data = NdArray::from_slice(&[0i32; 3]).unwrap();
    let dst_keys = keys(&["a", "b"], &["b", "a", "a"]);
    let mut dst = groupby(&dst_data, &dst_keys).unwrap();
    assert_eq!(dst.get_type(), src.get_type());

    dst.assign_from(&src, AssignErrorMode::Default, &ectx()).unwrap();
    assert_eq!(dst_data.to_vec::<i32>().unwrap(), vec![20, 10, 30]);
    // The source is only read.
    assert_eq!(src_data.to_vec::<i32>().unwrap(), vec![10, 20, 30]);
}

#[test]
fn scatter_requires_matching_group_sizes() {
    let src = groupby(
        &NdArray::from_slice(&[1i32, 2]).unwrap(),
        &keys(&["a", "b"], &["a", "a"]),
    )
    .unwrap();
    let dst_data = NdArray::from_slice(&[0i32; 2]).unwrap();
    let mut dst = groupby(&dst_data, &keys(&["a", "b"], &["a", "b"])).unwrap();

    let err = dst.assign_from(&src, AssignErrorMode::Default, &ectx()).unwrap_err();
    assert!(
        matches!(&err, NdError::Conversion(e) if e.kind == ConversionErrorKind::DimensionMismatch),
        "{err}"
    );
}
