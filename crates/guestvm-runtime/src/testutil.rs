// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Shared scaffolding for building a full [`GuestContext`] over
//! [`MockMemory`] in tests, instead of every module's test file hand-rolling
//! its own PEB layout.

use guestvm_abi::peb::{BufferRegion, GuestPtr, ProcessEnvironmentBlock};

use crate::entry::{entry_point, GuestContext};
use crate::error::GuestResult;
use crate::memory::{MockMemory, SharedMemory};
use crate::outb::MockOutb;

pub const PEB_ADDR: u64 = 0;
pub const INPUT_ADDR: u64 = 0x1000;
pub const OUTPUT_ADDR: u64 = 0x2000;
pub const HEAP_ADDR: u64 = 0x3000;
pub const HOST_CATALOG_ADDR: u64 = 0x4000;
pub const GUEST_ERROR_ADDR: u64 = 0x5000;
pub const PANIC_ADDR: u64 = 0x5100;
pub const TOTAL_SIZE: usize = 0x6000;

pub const BUF_SIZE: u64 = 0x800;
pub const HEAP_SIZE: u64 = 0x800;

/// A PEB with every region wired up to a distinct slab of a shared
/// [`MockMemory`], ready for [`build_ctx`].
#[must_use]
pub fn empty_peb() -> ProcessEnvironmentBlock {
    let mut peb = ProcessEnvironmentBlock::default();
    peb.security_cookie_seed = 0x1234_5678_9abc_def0;
    peb.input_data = BufferRegion::new(GuestPtr::new(INPUT_ADDR), BUF_SIZE);
    peb.output_data = BufferRegion::new(GuestPtr::new(OUTPUT_ADDR), BUF_SIZE);
    peb.guest_heap = BufferRegion::new(GuestPtr::new(HEAP_ADDR), HEAP_SIZE);
    peb.guest_error = BufferRegion::new(GuestPtr::new(GUEST_ERROR_ADDR), 256);
    peb.guest_panic_context = BufferRegion::new(GuestPtr::new(PANIC_ADDR), 256);
    peb
}

/// Builds a fully initialized context: writes `peb` (and, if non-empty,
/// `host_catalog_bytes`) into a fresh [`MockMemory`], resets both
/// shared-buffer stacks, and runs [`entry_point`] with `guest_main`.
///
/// # Panics
///
/// Panics if `entry_point` itself fails - a test harness setup error, not
/// something under test.
#[must_use]
pub fn build_ctx<F>(
    mut peb: ProcessEnvironmentBlock,
    host_catalog_bytes: &[u8],
    guest_main: F,
) -> GuestContext<MockMemory, MockOutb>
where
    F: Fn(&mut GuestContext<MockMemory, MockOutb>) -> GuestResult<()>,
{
    let mut memory = MockMemory::new(TOTAL_SIZE, GuestPtr::new(0));

    if !host_catalog_bytes.is_empty() {
        memory
            .slice_mut(GuestPtr::new(HOST_CATALOG_ADDR), host_catalog_bytes.len())
            .copy_from_slice(host_catalog_bytes);
        peb.host_function_definitions = BufferRegion::new(
            GuestPtr::new(HOST_CATALOG_ADDR),
            host_catalog_bytes.len() as u64,
        );
    }

    memory.write(GuestPtr::new(PEB_ADDR), peb);
    memory.write(peb.input_data.ptr, 8u64);
    memory.write(peb.output_data.ptr, 8u64);

    entry_point(
        GuestPtr::new(PEB_ADDR),
        memory,
        MockOutb::default(),
        4096,
        0,
        guest_main,
    )
    .expect("test harness entry_point failed")
}

/// [`build_ctx`] with no host catalog and an empty `guest_main`.
#[must_use]
pub fn build_empty_ctx() -> GuestContext<MockMemory, MockOutb> {
    build_ctx(empty_peb(), &[], |_ctx| Ok(()))
}
