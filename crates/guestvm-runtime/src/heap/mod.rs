// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Bump allocator backing the guest's `malloc`/`free` front-end.
//!
//! A monotonically advancing cursor into a fixed-size arena. Individual
//! allocations are never returned to the arena - only a front-end free list
//! built on top of this (out of scope here) can reuse freed blocks, and
//! only for the lifetime of the sandbox.
//!
//! Memory layout:
//! ```text
//! base (low address)
//!   │
//!   ▼  ← cursor starts here, moves up with each allocation
//!   │
//!   │ allocated objects
//!   │
//!   ▼
//! limit (high address, base + arena_size)
//! ```


use guestvm_abi::peb::GuestPtr;

use crate::error::{ErrorCode, GuestError, GuestResult};

/// Bump allocator over a fixed-size arena.
///
/// Seeds its hash-randomization from `security_cookie_seed`: the guest's
/// only source of entropy, since calling into the host for randomness
/// during allocator initialization would re-enter the dispatch path before
/// it exists.
pub struct BumpAllocator {
    base: GuestPtr,
    cursor: GuestPtr,
    limit: GuestPtr,
    seed: u64,
}

impl BumpAllocator {
    /// Creates an allocator over `size` bytes starting at `base`, seeded
    /// from `security_cookie_seed`.
    #[must_use]
    pub const fn new(base: GuestPtr, size: u64, security_cookie_seed: u64) -> Self {
        Self {
            base,
            cursor: base,
            limit: GuestPtr::new(base.as_u64().saturating_add(size)),
            seed: security_cookie_seed,
        }
    }

    /// The seed used for the allocator's internal hash-randomization.
    #[inline]
    #[must_use]
    pub const fn entropy_seed(&self) -> u64 {
        self.seed
    }

    /// Current cursor position.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> GuestPtr {
        self.cursor
    }

    /// Total arena size in bytes, fixed at construction.
    #[inline]
    #[must_use]
    pub const fn footprint_limit(&self) -> u64 {
        self.limit.as_u64() - self.base.as_u64()
    }

    /// Bytes used so far.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.cursor.as_u64() - self.base.as_u64()
    }

    /// Bytes remaining in the arena.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit.as_u64() - self.cursor.as_u64()
    }

    /// The `sbrk`-style primitive backing `malloc`.
    ///
    /// `n == 0` returns the current cursor without advancing. `n > 0`
    /// returns the current cursor and advances it by `n`; if that would
    /// exceed the arena, returns `MallocFailed` (the caller is expected to
    /// translate this into the high-level allocator's own failure, not
    /// abort the sandbox). `n < 0` is a front-end misconfiguration - this
    /// allocator is never compacted - and aborts with `FailureInAllocator`.
    pub fn more_core(&mut self, n: i64) -> GuestResult<GuestPtr> {
        if n < 0 {
            return Err(GuestError::new(
                ErrorCode::FailureInAllocator,
                "more_core called with a negative size; trim is not supported",
            ));
        }
        let n = n as u64;
        if n == 0 {
            return Ok(self.cursor);
        }
        let new_cursor = self
            .cursor
            .as_u64()
            .checked_add(n)
            .filter(|&c| c <= self.limit.as_u64())
            .ok_or_else(|| GuestError::new(ErrorCode::MallocFailed, "heap arena exhausted"))?;
        let start = self.cursor;
        self.cursor = GuestPtr::new(new_cursor);
        Ok(start)
    }

    /// Allocates `size` bytes aligned to `align` (a power of two).
    ///
    /// This is the convenience front-end most callers use instead of
    /// `more_core` directly; it folds alignment padding into the request.
    pub fn alloc(&mut self, size: u64, align: u64) -> GuestResult<GuestPtr> {
        let mask = align.saturating_sub(1);
        let misalignment = self.cursor.as_u64() & mask;
        let padding = if misalignment == 0 {
            0
        } else {
            align - misalignment
        };
        let total = padding
            .checked_add(size)
            .ok_or_else(|| GuestError::new(ErrorCode::MallocFailed, "allocation size overflow"))?;
        let start = self.more_core(i64::try_from(total).map_err(|_| {
            GuestError::new(ErrorCode::MallocFailed, "allocation size exceeds i64::MAX")
        })?)?;
        Ok(GuestPtr::new(start.as_u64() + padding))
    }
}
