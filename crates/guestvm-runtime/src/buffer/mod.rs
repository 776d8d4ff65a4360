// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The shared-buffer stack protocol: a LIFO of length-prefixed frames
//! layered over a fixed [`BufferRegion`].
//!
//! Byte `0..8` of the region holds a 64-bit relative offset `sp` pointing
//! at the next free byte (`8` when empty). Each frame is stored as
//! `[payload][8-byte back-pointer to the frame's start offset]`; `sp`
//! advances past the back-pointer. The payload itself begins with a 4-byte
//! little-endian size prefix, so a frame can be read back without first
//! knowing its length.

#[cfg(test)]
mod mod_test;

use guestvm_abi::peb::{BufferRegion, GuestPtr};

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use crate::error::{ErrorCode, GuestError, GuestResult};
use crate::memory::SharedMemory;

/// Offset, within the region, of the first free byte in an empty stack.
const EMPTY_SP: u64 = 8;

/// A LIFO of length-prefixed frames over one [`BufferRegion`].
pub struct SharedBufferStack {
    region: BufferRegion,
}

impl SharedBufferStack {
    /// Wraps a region as a shared-buffer stack. Does not touch memory;
    /// call [`Self::reset`] to initialize a fresh region.
    #[must_use]
    pub const fn new(region: BufferRegion) -> Self {
        Self { region }
    }

    /// Initializes the region to the empty stack (`sp = 8`).
    pub fn reset<M: SharedMemory>(&self, mem: &mut M) {
        mem.write(self.region.ptr, EMPTY_SP);
    }

    /// Reads the current stack pointer, validating it against the
    /// well-formedness invariant (`sp == 8` or `sp >= 16`, and
    /// `8 <= sp <= buffer_size`).
    fn read_sp<M: SharedMemory>(&self, mem: &M) -> GuestResult<u64> {
        let sp: u64 = mem.read(self.region.ptr);
        if sp < EMPTY_SP || sp > self.region.len {
            return Err(GuestError::new(
                ErrorCode::GuestError,
                "shared buffer stack pointer is corrupt",
            ));
        }
        Ok(sp)
    }

    fn write_sp<M: SharedMemory>(&self, mem: &mut M, sp: u64) {
        mem.write(self.region.ptr, sp);
    }

    /// Returns true if the stack currently holds no frames.
    pub fn is_empty<M: SharedMemory>(&self, mem: &M) -> GuestResult<bool> {
        Ok(self.read_sp(mem)? == EMPTY_SP)
    }

    /// Pushes `payload` (already including its own 4-byte size prefix) as
    /// one frame.
    pub fn push<M: SharedMemory>(&self, mem: &mut M, payload: &[u8]) -> GuestResult<()> {
        let sp = self.read_sp(mem)?;
        let size = payload.len() as u64;
        let frame_end = sp
            .checked_add(size)
            .and_then(|v| v.checked_add(8))
            .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "frame size overflow"))?;
        if frame_end > self.region.len {
            return Err(GuestError::new(
                ErrorCode::GuestError,
                "not enough space on shared buffer",
            ));
        }

        let payload_ptr = self.region.ptr.offset(sp);
        mem.slice_mut(payload_ptr, payload.len())
            .copy_from_slice(payload);

        let back_ptr = self.region.ptr.offset(sp + size);
        mem.write(back_ptr, sp);

        self.write_sp(mem, sp + size + 8);
        Ok(())
    }

    /// Pops the most recently pushed frame, returning an owned copy of its
    /// bytes (size prefix included).
    pub fn pop<M: SharedMemory>(&self, mem: &mut M) -> GuestResult<Vec<u8>> {
        let sp = self.read_sp(mem)?;
        if sp < 16 {
            return Err(GuestError::new(
                ErrorCode::GuestError,
                "pop on an empty shared buffer stack",
            ));
        }

        let back_ptr = self.region.ptr.offset(sp - 8);
        let frame_start: u64 = mem.read(back_ptr);
        if frame_start > sp.saturating_sub(8) {
            return Err(GuestError::new(
                ErrorCode::GuestError,
                "shared buffer back-pointer is corrupt",
            ));
        }

        let size_ptr = self.region.ptr.offset(frame_start);
        let size_bytes: [u8; 4] = mem.read(size_ptr);
        let payload_len = u32::from_le_bytes(size_bytes) as u64;
        let frame_len = payload_len
            .checked_add(4)
            .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "frame length overflow"))?;

        if frame_start + frame_len + 8 != sp {
            return Err(GuestError::new(
                ErrorCode::GuestError,
                "shared buffer frame length does not match stack pointer",
            ));
        }

        let frame_ptr = self.region.ptr.offset(frame_start);
        let copy = mem.slice(frame_ptr, frame_len as usize).to_vec();

        let zero_len = (sp - frame_start) as usize;
        mem.slice_mut(frame_ptr, zero_len).fill(0);

        self.write_sp(mem, frame_start);
        Ok(copy)
    }

    /// Returns the underlying region, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> BufferRegion {
        self.region
    }

    #[cfg(test)]
    fn sp<M: SharedMemory>(&self, mem: &M) -> u64 {
        mem.read(self.region.ptr)
    }

    #[cfg(test)]
    const fn base(&self) -> GuestPtr {
        self.region.ptr
    }
}
