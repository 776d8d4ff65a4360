// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Guest-to-host signalling (`OUTB`).
//!
//! A real partition has no interrupt controller configured for the guest;
//! the only way out is `OUTB` (carries a 16-bit port and an 8-bit payload)
//! or `HLT`. [`PortOutb`] is the in-partition implementation, issuing the
//! `out` instruction directly. [`CallbackOutb`] is used when the guest runs
//! in-process (no hypervisor): the PEB carries a function pointer instead.

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use guestvm_abi::peb::GuestPtr;
use guestvm_abi::ports;

/// A log record follows in the output buffer.
pub const PORT_LOG: u16 = ports::LOG;
/// A host function call follows in the output buffer.
pub const PORT_CALL_FUNCTION: u16 = ports::CALL_FUNCTION;
/// Unstructured abort; the payload carries the abort code.
pub const PORT_ABORT: u16 = ports::ABORT;

/// Signals the host on a given port with an 8-bit payload.
pub trait Outb {
    fn signal(&mut self, port: u16, value: u8);
}

/// In-partition `OUTB`: a direct `out` instruction.
///
/// Zero-sized; valid only on `x86_64`, the only target this sandbox runs
/// guests on.
#[derive(Default)]
pub struct PortOutb;

impl Outb for PortOutb {
    #[cfg(target_arch = "x86_64")]
    fn signal(&mut self, port: u16, value: u8) {
        // SAFETY: `out` to an arbitrary port is inherently unsafe from Rust's
        // perspective, but this is precisely the guest's sanctioned channel
        // to the host - there is no memory-safety contract to uphold here,
        // only the wire protocol the host expects on this port.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags),
            );
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn signal(&mut self, _port: u16, _value: u8) {
        unimplemented!("PortOutb is only valid for x86_64 guests")
    }
}

/// Function pointer shape the host installs at `peb.outb_ptr` for
/// in-process (no hypervisor) runs.
pub type OutbCallback = unsafe extern "C" fn(context: *mut core::ffi::c_void, port: u16, value: u8);

/// In-process `OUTB`: calls back through a host-supplied function pointer
/// instead of trapping to a hypervisor.
pub struct CallbackOutb {
    callback: GuestPtr,
    context: GuestPtr,
}

impl CallbackOutb {
    #[must_use]
    pub const fn new(callback: GuestPtr, context: GuestPtr) -> Self {
        Self { callback, context }
    }
}

impl Outb for CallbackOutb {
    fn signal(&mut self, port: u16, value: u8) {
        if self.callback.is_null() {
            return;
        }
        // SAFETY: `callback` was installed by the host at PEB-construction
        // time with exactly this signature; this is the documented
        // in-process contract, mirrored on the host side.
        let f: OutbCallback = unsafe { core::mem::transmute(self.callback.as_u64() as usize) };
        // SAFETY: see above; `context` is an opaque token round-tripped
        // back to the host, never dereferenced by the guest.
        unsafe { f(self.context.as_u64() as *mut core::ffi::c_void, port, value) };
    }
}

/// Records every signal for assertions in tests, without touching real
/// hardware or a callback.
#[cfg(any(test, feature = "std"))]
#[derive(Default)]
pub struct MockOutb {
    pub calls: Vec<(u16, u8)>,
}

#[cfg(any(test, feature = "std"))]
impl Outb for MockOutb {
    fn signal(&mut self, port: u16, value: u8) {
        self.calls.push((port, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_outb_records_calls_in_order() {
        let mut outb = MockOutb::default();
        outb.signal(PORT_LOG, 0);
        outb.signal(PORT_CALL_FUNCTION, 0);
        outb.signal(PORT_ABORT, 7);
        assert_eq!(
            outb.calls,
            vec![(PORT_LOG, 0), (PORT_CALL_FUNCTION, 0), (PORT_ABORT, 7)]
        );
    }
}
