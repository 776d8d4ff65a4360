// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

use guestvm_abi::peb::{BufferRegion, GuestPtr};

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use super::SharedBufferStack;
use crate::memory::MockMemory;

fn stack(size: u64) -> (SharedBufferStack, MockMemory) {
    let mut mem = MockMemory::new(size as usize, GuestPtr::new(0));
    let region = BufferRegion::new(GuestPtr::new(0), size);
    let stack = SharedBufferStack::new(region);
    stack.reset(&mut mem);
    (stack, mem)
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[test]
fn push_then_pop_round_trips_and_restores_sp() {
    let (stack, mut mem) = stack(256);
    let sp_before = stack.sp(&mem);

    let f = frame(b"hello");
    stack.push(&mut mem, &f).unwrap();
    assert_ne!(stack.sp(&mem), sp_before);

    let popped = stack.pop(&mut mem).unwrap();
    assert_eq!(popped, f);
    assert_eq!(stack.sp(&mem), sp_before);
}

#[test]
fn bytes_beyond_sp_are_zeroed_after_pop() {
    let (stack, mut mem) = stack(256);
    let f = frame(b"zeroed?");
    stack.push(&mut mem, &f).unwrap();
    stack.pop(&mut mem).unwrap();

    let base = stack.base();
    let region_len = stack.region().len as usize;
    let raw = mem.slice(base, region_len);
    assert!(raw[8..].iter().all(|&b| b == 0));
}

#[test]
fn push_exact_fit_succeeds_one_byte_short_fails() {
    // buffer is 8 (sp) + 5 (payload incl. size prefix) + 8 (back-ptr) == 21 bytes.
    let payload = [0xABu8; 1];
    let f = frame(&payload);
    assert_eq!(f.len(), 5);

    let (stack, mut mem) = stack(21);
    stack.push(&mut mem, &f).unwrap();

    let (short_stack, mut short_mem) = stack(20);
    assert!(short_stack.push(&mut short_mem, &f).is_err());
}

#[test]
fn pop_on_empty_stack_fails() {
    let (stack, mut mem) = stack(64);
    assert!(stack.pop(&mut mem).is_err());
}

#[test]
fn multiple_nested_pushes_pop_in_lifo_order() {
    let (stack, mut mem) = stack(256);
    let a = frame(b"first");
    let b = frame(b"second");
    stack.push(&mut mem, &a).unwrap();
    stack.push(&mut mem, &b).unwrap();

    assert_eq!(stack.pop(&mut mem).unwrap(), b);
    assert_eq!(stack.pop(&mut mem).unwrap(), a);
}

#[test]
fn is_empty_reflects_state() {
    let (stack, mut mem) = stack(64);
    assert!(stack.is_empty(&mem).unwrap());
    let f = frame(b"x");
    stack.push(&mut mem, &f).unwrap();
    assert!(!stack.is_empty(&mem).unwrap());
}

mod proptests {
    use proptest::prelude::*;

    use super::{frame, stack};

    /// For any sequence of valid push/pop pairs, `sp` returns to its
    /// pre-push value and every byte beyond `sp` is zero (spec.md §8).
    proptest! {
        #[test]
        fn matched_push_pop_pairs_restore_sp_and_zero_the_tail(
            payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..16)
        ) {
            let (s, mut mem) = stack(8192);
            let sp_before = s.sp(&mem);

            for payload in &payloads {
                let f = frame(payload);
                s.push(&mut mem, &f).unwrap();
            }
            for payload in payloads.iter().rev() {
                let popped = s.pop(&mut mem).unwrap();
                prop_assert_eq!(&popped, &frame(payload));
            }

            prop_assert_eq!(s.sp(&mem), sp_before);
            let base = s.base();
            let region_len = s.region().len as usize;
            let raw = mem.slice(base, region_len);
            prop_assert!(raw[8..].iter().all(|&b| b == 0));
        }

        /// Pushing past capacity never corrupts `sp`: a rejected push
        /// leaves the stack exactly as it was before the attempt.
        #[test]
        fn rejected_push_leaves_sp_unchanged(oversized in proptest::collection::vec(any::<u8>(), 0..64)) {
            let (s, mut mem) = stack(24);
            let sp_before = s.sp(&mem);
            let f = frame(&oversized);
            if f.len() as u64 + 8 > 24 - 8 {
                let _ = s.push(&mut mem, &f);
                prop_assert_eq!(s.sp(&mem), sp_before);
            }
        }
    }
}
