// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The Process Environment Block (PEB): the fixed shared-memory record
//! through which a host and its guest agree on everything else.
//!
//! The host allocates one PEB per sandbox, maps it read/write into both
//! itself and the guest-physical address space, and passes its address to
//! the guest's entry point. Every other shared region (buffers, heap,
//! function catalog, error/panic scratch space) is reached by following a
//! pointer out of this record - nothing else is agreed upon out of band.
//!
//! # Layout
//!
//! The PEB has a stable, `#[repr(C)]` layout. Pointer-sized fields are
//! stored as raw `u64` guest-physical addresses rather than typed Rust
//! pointers: the struct must remain valid to construct (and read) from the
//! host side, which has no business forming a Rust reference into another
//! process's address space.

use core::fmt;

/// A pointer into the guest's address space, as seen from either side of
/// the host/guest boundary.
///
/// This is deliberately a bare `u64`, not a Rust pointer: PEB fields are
/// written by the host before the guest ever runs, and read back by the
/// host after the guest halts. A `*mut u8` would be unsound to construct
/// outside the address space it targets.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct GuestPtr(u64);

impl GuestPtr {
    /// The null guest pointer.
    pub const NULL: Self = Self(0);

    /// Creates a guest pointer from a raw address.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw address.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this is the null pointer.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the pointer advanced by `delta` bytes.
    #[inline]
    #[must_use]
    pub const fn offset(self, delta: u64) -> Self {
        Self(self.0.wrapping_add(delta))
    }
}

impl fmt::Debug for GuestPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestPtr({:#x})", self.0)
    }
}

impl From<u64> for GuestPtr {
    fn from(addr: u64) -> Self {
        Self::new(addr)
    }
}

/// A pointer + length pair describing one of the PEB's shared buffers.
///
/// `len` of zero is only valid for the host-exception and host-function
/// catalog regions before the host has populated them; the three largest
/// buffers (`input_data`, `output_data`, `guest_heap`) must be non-zero and
/// page-sized per the PEB invariants.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
#[repr(C)]
pub struct BufferRegion {
    /// Start of the region, in guest-physical address space.
    pub ptr: GuestPtr,
    /// Size of the region in bytes.
    pub len: u64,
}

impl BufferRegion {
    /// An empty, unpopulated region.
    pub const EMPTY: Self = Self {
        ptr: GuestPtr::NULL,
        len: 0,
    };

    /// Creates a new region.
    #[inline]
    #[must_use]
    pub const fn new(ptr: GuestPtr, len: u64) -> Self {
        Self { ptr, len }
    }

    /// Returns true if the region has never been populated.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// The Process Environment Block.
///
/// Created once by the host for the lifetime of the sandbox. All pointer
/// fields refer to regions inside the same guest-physical mapping; the
/// three largest buffers (`input_data`, `output_data`, `guest_heap`) must be
/// non-zero, page-sized regions. The layout below must stay bit-identical
/// between host and guest builds - there is no version negotiation.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct ProcessEnvironmentBlock {
    /// Seed for the guest's stack-protector cookie. The only source of
    /// entropy visible to the guest.
    pub security_cookie_seed: u64,

    /// Written by the guest during initialization; the host reads this to
    /// invoke the dispatcher on the next entry.
    pub guest_function_dispatch_ptr: GuestPtr,

    /// Host-advertised catalog of host functions the guest may call,
    /// serialized in the same record format as a call frame.
    pub host_function_definitions: BufferRegion,

    /// Scratch buffer the host uses to convey an exception thrown while
    /// servicing an outbound (guest-to-host) call.
    pub host_exception: BufferRegion,

    /// Buffer the guest writes to on abnormal termination (see
    /// `GuestError`). The host reads this after every halt.
    pub guest_error: BufferRegion,

    /// Pointer to the loaded guest image, used only for a sanity header
    /// check at startup.
    pub code: GuestPtr,

    /// Optional callback used when the guest runs in-process (no
    /// hypervisor) instead of inside a partition. Null when running in a
    /// real partition, in which case `OUTB` is a port-I/O instruction.
    pub outb_ptr: GuestPtr,
    /// Opaque context passed back to `outb_ptr` on every call.
    pub outb_context: GuestPtr,

    /// The two shared-buffer stacks used for request/response framing.
    pub input_data: BufferRegion,
    pub output_data: BufferRegion,

    /// Buffer into which the guest copies a panic message immediately
    /// before an unstructured abort.
    pub guest_panic_context: BufferRegion,

    /// Backing arena for the guest's bump allocator.
    pub guest_heap: BufferRegion,

    /// Minimum permitted stack address, for stack-boundary queries.
    pub guest_stack_min: u64,
}

impl ProcessEnvironmentBlock {
    /// Returns true if the guest should run in-process (no hypervisor),
    /// i.e. signal the host via `outb_ptr` rather than a port-I/O
    /// instruction.
    #[inline]
    #[must_use]
    pub const fn runs_in_process(&self) -> bool {
        !self.outb_ptr.is_null()
    }
}
