#![allow(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]

use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::{ConversionErrorKind, KernelRequest};

/// Writes its value; counts its own destruction.
#[repr(C)]
struct Leaf {
    base: KernelPrefix,
    value: u32,
    drops: Arc<AtomicUsize>,
}

// SAFETY: repr(C), prefix first.
unsafe impl KernelRecord for Leaf {}

/// Runs its child and adds one to the result.
#[repr(C)]
struct AddOne {
    base: KernelPrefix,
    child_offset: usize,
    drops: Arc<AtomicUsize>,
}

// SAFETY: repr(C), prefix first.
unsafe impl KernelRecord for AddOne {}

unsafe fn leaf_single(dst: *mut u8, _src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let leaf = &*ckp.cast::<Leaf>();
    dst.cast::<u32>().write_unaligned(leaf.value);
    Ok(())
}

unsafe fn leaf_destruct(ckp: *mut KernelPrefix) {
    let leaf = ckp.cast::<Leaf>();
    (*leaf).drops.fetch_add(1, Ordering::SeqCst);
    std::ptr::drop_in_place(leaf);
}

unsafe fn add_one_single(dst: *mut u8, src: *const u8, ckp: *mut KernelPrefix) -> Result<(), ConversionError> {
    let offset = (*ckp.cast::<AddOne>()).child_offset;
    KernelPrefix::call_single(KernelPrefix::child(ckp, offset), dst, src)?;
    let value = dst.cast::<u32>().read_unaligned();
    dst.cast::<u32>().write_unaligned(value + 1);
    Ok(())
}

unsafe fn add_one_destruct(ckp: *mut KernelPrefix) {
    let record = ckp.cast::<AddOne>();
    KernelPrefix::destroy_child(ckp, (*record).child_offset);
    (*record).drops.fetch_add(1, Ordering::SeqCst);
    std::ptr::drop_in_place(record);
}

/// Emplace `depth` AddOne records followed by a leaf writing `base_value`.
fn build_chain(ckb: &mut KernelBuilder, depth: usize, base_value: u32, drops: &Arc<AtomicUsize>) {
    let mut offset = 0;
    for _ in 0..depth {
        // The child offset is only recorded once the child's space exists.
        let end = ckb
            .emplace(
                offset,
                AddOne {
                    base: KernelPrefix::new(KernelOp::Single(add_one_single), Some(add_one_destruct)),
                    child_offset: 0,
                    drops: Arc::clone(drops),
                },
            )
            .unwrap();
        ckb.ensure_capacity_leaf(end).unwrap();
        unsafe { ckb.get_at::<AddOne>(offset).unwrap().child_offset = end - offset };
        offset = end;
    }
    ckb.emplace(
        offset,
        Leaf {
            base: KernelPrefix::new(KernelOp::Single(leaf_single), Some(leaf_destruct)),
            value: base_value,
            drops: Arc::clone(drops),
        },
    )
    .unwrap();
}

#[test]
fn fresh_builder_has_empty_root() {
    let mut ckb = KernelBuilder::new();
    assert_eq!(ckb.capacity(), INITIAL_CAPACITY);
    let root = ckb.record_at(0).unwrap();
    assert!(!root.has_single());
    assert!(!root.has_strided());
    assert!(!root.has_destructor());

    let mut out = 0u32;
    let err = unsafe { ckb.call_single(std::ptr::from_mut(&mut out).cast(), std::ptr::null()) }.unwrap_err();
    assert_eq!(err.kind, ConversionErrorKind::UnsetKernel);
}

#[test]
fn chains_survive_growth_from_tiny_buffer() {
    let drops = Arc::new(AtomicUsize::new(0));
    for depth in [0usize, 1, 3, 17, 64] {
        let mut ckb = KernelBuilder::with_capacity(size_of::<KernelPrefix>());
        build_chain(&mut ckb, depth, 100, &drops);
        assert!(ckb.capacity() >= depth * size_of::<AddOne>() + size_of::<Leaf>());

        // Grow again after construction; recorded offsets must still resolve.
        let capacity = ckb.capacity();
        ckb.ensure_capacity(capacity * 4).unwrap();

        let mut out = 0u32;
        unsafe { ckb.call_single(std::ptr::from_mut(&mut out).cast(), std::ptr::null()) }.unwrap();
        assert_eq!(out, 100 + depth as u32);
    }
}

#[test]
fn dropping_builder_destroys_each_record_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    {
        let mut ckb = KernelBuilder::with_capacity(16);
        build_chain(&mut ckb, 9, 0, &drops);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 10);
    assert_eq!(Arc::strong_count(&drops), 1);
}

#[test]
fn reset_destroys_then_allows_reuse() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut ckb = KernelBuilder::new();
    build_chain(&mut ckb, 2, 5, &drops);
    ckb.reset();
    assert_eq!(drops.load(Ordering::SeqCst), 3);
    assert!(!ckb.record_at(0).unwrap().has_single());

    build_chain(&mut ckb, 1, 7, &drops);
    let mut out = 0u32;
    unsafe { ckb.call_single(std::ptr::from_mut(&mut out).cast(), std::ptr::null()) }.unwrap();
    assert_eq!(out, 8);
    drop(ckb);
    assert_eq!(drops.load(Ordering::SeqCst), 5);
}

#[test]
fn set_operation_grows_and_returns_next_offset() {
    let mut ckb = KernelBuilder::with_capacity(0);
    let offset = 4 * size_of::<KernelPrefix>();
    let end = ckb.set_operation(offset, KernelOp::Single(leaf_single)).unwrap();
    assert_eq!(end, offset + size_of::<KernelPrefix>());
    assert!(ckb.record_at(offset).unwrap().has_single());
    assert!(!ckb.record_at(offset).unwrap().has_strided());
}

#[test]
fn unknown_request_code_is_rejected() {
    assert_eq!(KernelRequest::try_from(0), Ok(KernelRequest::Single));
    assert_eq!(KernelRequest::try_from(1), Ok(KernelRequest::Strided));
    assert_eq!(
        KernelRequest::try_from(7),
        Err(KernelError::UnsupportedKernelRequest(7))
    );
}

#[test]
fn align_offset_rounds_up() {
    assert_eq!(align_offset(0, 8), 0);
    assert_eq!(align_offset(1, 8), 8);
    assert_eq!(align_offset(24, 16), 32);
    assert_eq!(align_offset(13, 1), 13);
}

#[test]
fn out_of_range_offsets_are_errors() {
    let mut ckb = KernelBuilder::new();
    let capacity = ckb.capacity();
    assert_eq!(
        ckb.record_at(4096).map(|_| ()),
        Err(KernelError::InvalidOffset { offset: 4096, capacity })
    );
    assert_eq!(
        ckb.record_ptr(capacity).map(|_| ()),
        Err(KernelError::InvalidOffset { offset: capacity, capacity })
    );
    assert_eq!(
        unsafe { ckb.get_at::<Leaf>(usize::MAX - 4) }.map(|_| ()),
        Err(KernelError::InvalidOffset { offset: usize::MAX - 4, capacity })
    );
    // The builder stays usable afterwards.
    assert!(!ckb.record_at(0).unwrap().has_single());
}

#[test]
fn misaligned_offsets_are_errors() {
    let mut ckb = KernelBuilder::new();
    let capacity = ckb.capacity();
    assert_eq!(
        ckb.record_at(3).map(|_| ()),
        Err(KernelError::InvalidOffset { offset: 3, capacity })
    );
    let drops = Arc::new(AtomicUsize::new(0));
    let record = Leaf {
        base: KernelPrefix::new(KernelOp::Single(leaf_single), Some(leaf_destruct)),
        value: 1,
        drops: Arc::clone(&drops),
    };
    assert_eq!(
        ckb.emplace(usize::MAX - 1, record).map(|_| ()),
        Err(KernelError::InvalidOffset { offset: usize::MAX - 1, capacity })
    );
    // The rejected record is dropped, not leaked into the arena.
    assert_eq!(Arc::strong_count(&drops), 1);
}
