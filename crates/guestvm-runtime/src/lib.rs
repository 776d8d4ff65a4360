// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! # guestvm-runtime
//!
//! The guest-side runtime of a micro-VM sandbox. This is the code that runs
//! *inside* the partition: it reads a function call off the shared input
//! buffer, dispatches it to a registered handler, and writes the reply back
//! before halting to return control to the host.
//!
//! This crate provides:
//! - The bump allocator backing the guest's dynamic allocation (`heap`)
//! - The shared-buffer stack protocol for framed request/response (`buffer`)
//! - The sorted-vector function registry (`registry`)
//! - Wire encode/decode for call frames and results (`protocol`)
//! - The inbound dispatcher state machine (`dispatcher`)
//! - The outbound host-call protocol (`outbound`)
//! - Structured-exit error handling, replacing `setjmp`/`longjmp` with
//!   `Result` propagation (`error`)
//! - The `OUTB` signalling abstraction, real (port I/O) and mocked (`outb`)
//! - The entry point called by the host after loading the guest image
//!   (`entry`)
//!
//! The guest runs strictly single-threaded and cooperative: the only
//! suspension points are `OUTB` and `HLT`. There is no scheduler here and no
//! thread-safety story beyond "don't call this reentrantly."

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

pub mod buffer;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod heap;
pub mod macros;
pub mod memory;
pub mod outb;
pub mod outbound;
pub mod protocol;
pub mod registry;

#[cfg(test)]
pub(crate) mod testutil;

pub use entry::{GuestContext, entry_point};
pub use error::{GuestError, GuestResult, abort, abort_with_code};
pub use memory::SharedMemory;

#[cfg(any(test, feature = "std"))]
pub use memory::MockMemory;

/// Crate version, surfaced for diagnostics only.
pub const VERSION: &str = match option_env!("GUESTVM_RUNTIME_VERSION") {
    Some(v) => v,
    None => "unknown",
};
