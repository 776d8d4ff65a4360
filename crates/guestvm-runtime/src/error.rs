// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The guest's recoverable error type.
//!
//! This replaces the source protocol's `setjmp`/`longjmp` structured exit:
//! every fallible step in the dispatch path returns a [`GuestResult`], and
//! the dispatcher's outer frame (`dispatcher::dispatch`) is the single place
//! that turns an `Err` into an error frame on the guest-error buffer. There
//! is no saved execution context to jump to - normal `?` propagation up the
//! call stack plays that role.

use core::fmt;

#[cfg(any(test, feature = "std"))]
use std::{
    string::{String, ToString as _},
    vec::Vec,
};

#[cfg(not(any(test, feature = "std")))]
use alloc::{
    string::{String, ToString as _},
    vec::Vec,
};

pub use guestvm_abi::types::ErrorCode;

use crate::entry::CallContext;
use crate::memory::SharedMemory;
use crate::outb::{Outb, PORT_ABORT};

/// Maximum length, in bytes, of a guest error message once truncated for
/// the guest-error buffer. Matches the smallest buffer a host is expected
/// to provision for `guest_error`.
pub const MAX_MESSAGE_LEN: usize = 256;

/// A recoverable guest error: an [`ErrorCode`] plus a human-readable
/// message, the same shape the host reads back out of the guest-error
/// buffer after a halt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestError {
    pub code: ErrorCode,
    pub message: String,
}

impl GuestError {
    /// Builds a new error, truncating `message` to [`MAX_MESSAGE_LEN`]
    /// bytes on a `char` boundary.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self { code, message }
    }

    /// Shorthand for [`ErrorCode::UnknownError`] with a message built from
    /// a `Display`-able value (used to wrap unexpected internal failures).
    #[must_use]
    pub fn unknown(message: impl fmt::Display) -> Self {
        Self::new(ErrorCode::UnknownError, message.to_string())
    }
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GuestError {}

/// Result alias used throughout the dispatch path.
pub type GuestResult<T> = Result<T, GuestError>;

/// Unstructured abort: terminates the sandbox outright rather than
/// returning an error to the dispatcher (spec.md §4.5).
///
/// Unlike every other fallible operation in this crate, this is not a
/// `Result` - the caller is not expected to recover. It copies `message`
/// into `guest_panic_context` (length-prefixed, truncated to fit) and
/// signals `OUTB(PORT_ABORT, code)`; in a real partition the host tears
/// the sandbox down immediately on observing that signal, so nothing
/// after this call runs. In the `std`/test harness there is no host to do
/// that, so this returns normally after signalling, letting tests assert
/// on the panic buffer and the abort signal.
pub fn abort_with_code<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    code: u8,
    message: &str,
) {
    log::debug!("abort_with_code: code={code} message={message:?}");
    let region = ctx.peb.guest_panic_context;
    if !region.is_empty() {
        // Truncate the message itself, not the finished record, so the
        // 4-byte length prefix always matches what was actually written.
        let budget = (region.len as usize).saturating_sub(4);
        let mut end = message.len().min(budget);
        while end > 0 && !message.is_char_boundary(end) {
            end -= 1;
        }
        let message = &message[..end];

        let mut bytes = Vec::with_capacity(message.len() + 4);
        bytes.extend_from_slice(&(message.len() as u32).to_le_bytes());
        bytes.extend_from_slice(message.as_bytes());
        ctx.memory
            .slice_mut(region.ptr, bytes.len())
            .copy_from_slice(&bytes);
    }
    ctx.outb.signal(PORT_ABORT, code);
}

/// `abort_with_code(ctx, 0, "")`.
pub fn abort<M: SharedMemory, O: Outb>(ctx: &mut CallContext<'_, M, O>) {
    abort_with_code(ctx, 0, "");
}
